#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Dispatcher routing and failure isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use habbo_protocol::core::packet::ClientPacket;
use habbo_protocol::error::{ProtocolError, Result};
use habbo_protocol::protocol::dispatcher::{DispatchOutcome, Dispatcher};
use habbo_protocol::protocol::incoming::{InboundMessage, UniqueId, VersionCheck};
use habbo_protocol::service::events::EventBus;
use habbo_protocol::transport::session::{ChannelTransport, ConnectionId, Session};
use habbo_protocol::utils::metrics::Metrics;

fn session(id: u64) -> Arc<Session> {
    let (transport, _rx, _) = ChannelTransport::channel(8);
    Arc::new(Session::new(ConnectionId::new(id), Box::new(transport), None, None))
}

fn dispatcher() -> (Dispatcher, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    (Dispatcher::new(EventBus::new(16), Arc::clone(&metrics)), metrics)
}

async fn fail() -> Result<()> {
    Err(ProtocolError::Handler("bad packet".into()))
}

async fn explode() -> Result<()> {
    panic!("handler bug")
}

#[tokio::test]
async fn test_unknown_id_does_not_stop_later_packets() {
    let (dispatcher, metrics) = dispatcher();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    dispatcher
        .register_handler(586, "Count", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        })
        .unwrap();

    let session = session(1);
    let payload: Vec<u8> = (0..64).collect();
    assert!(matches!(
        dispatcher
            .handle(&session, ClientPacket::from_parts(9999, &payload))
            .await,
        DispatchOutcome::Unknown
    ));
    assert!(dispatcher
        .handle(&session, ClientPacket::from_parts(586, &[]))
        .await
        .is_handled());

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.unknown_headers, 1);
    assert_eq!(snapshot.frames_received, 2);
}

#[tokio::test]
async fn test_failures_are_isolated_per_packet() {
    let (dispatcher, metrics) = dispatcher();
    dispatcher.register_handler(1, "Fail", |_, _| fail().boxed()).unwrap();
    dispatcher.register_handler(2, "Panic", |_, _| explode().boxed()).unwrap();
    dispatcher
        .register_handler(3, "Fine", |_, _| async { Ok(()) }.boxed())
        .unwrap();

    let session = session(2);
    assert!(matches!(
        dispatcher.handle(&session, ClientPacket::from_parts(1, &[])).await,
        DispatchOutcome::Failed(ProtocolError::Handler(_))
    ));
    assert!(matches!(
        dispatcher.handle(&session, ClientPacket::from_parts(2, &[])).await,
        DispatchOutcome::Failed(ProtocolError::HandlerPanicked(2))
    ));
    assert!(dispatcher
        .handle(&session, ClientPacket::from_parts(3, &[]))
        .await
        .is_handled());
    assert_eq!(metrics.snapshot().handler_failures, 2);
}

#[tokio::test]
async fn test_reregistration_overrides() {
    let (dispatcher, _) = dispatcher();
    dispatcher.register_handler(10, "Old", |_, _| fail().boxed()).unwrap();
    dispatcher
        .register_handler(10, "New", |_, _| async { Ok(()) }.boxed())
        .unwrap();

    assert!(dispatcher
        .handle(&session(3), ClientPacket::from_parts(10, &[]))
        .await
        .is_handled());
    assert_eq!(dispatcher.headers(), vec![10]);
}

#[tokio::test]
async fn test_typed_handler_updates_session() {
    let (dispatcher, _) = dispatcher();
    dispatcher
        .register::<UniqueId, _, _>(|session, message| async move {
            session.set_machine_id(message.machine_id);
            Ok(())
        })
        .unwrap();

    let mut payload = Vec::new();
    for field in ["~machine", "fp", "info"] {
        payload.extend_from_slice(&(field.len() as u16).to_be_bytes());
        payload.extend_from_slice(field.as_bytes());
    }

    let session = session(4);
    assert!(dispatcher
        .handle(&session, ClientPacket::from_parts(1390, &payload))
        .await
        .is_handled());
    assert_eq!(session.machine_id(), "~machine");
}

#[tokio::test]
async fn test_publisher_emits_event_with_connection_id() {
    let (dispatcher, _) = dispatcher();
    dispatcher.register_publisher::<VersionCheck>().unwrap();
    let mut events = dispatcher.events().subscribe();

    let mut payload = 401i32.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0, 1, b'p', 0, 1, b'u']);
    dispatcher
        .handle(&session(77), ClientPacket::from_parts(2602, &payload))
        .await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.connection_id, ConnectionId::new(77));
    match &event.message {
        InboundMessage::VersionCheck(check) => {
            assert_eq!(check.client_id, 401);
            assert_eq!(check.client_path, "p");
            assert_eq!(check.external_variables_url, "u");
        }
        other => panic!("unexpected event {other:?}"),
    }
}
