#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Session registry lifecycle: unique ids, idempotent removal, single close.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use habbo_protocol::crypto::encryption::HandshakePhase;
use habbo_protocol::error::{ProtocolError, Result};
use habbo_protocol::transport::registry::SessionRegistry;
use habbo_protocol::transport::session::{ConnectionId, Transport};
use habbo_protocol::utils::worker::CryptoPool;

/// Transport that counts writes and closes.
#[derive(Default)]
struct CountingTransport {
    writes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Transport for CountingTransport {
    fn write(&self, _frame: Bytes) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(common::server_key(), CryptoPool::new(2))
}

#[tokio::test]
async fn test_new_session_starts_uninitialized() {
    let registry = registry();
    let session = registry
        .create(Box::new(CountingTransport::default()), None)
        .await
        .unwrap();

    assert_eq!(session.handshake_phase(), Some(HandshakePhase::Uninitialized));
    assert!(!session.is_handshake_finished());
    assert!(!session.is_authenticated());
    assert_eq!(session.machine_id(), "");
}

#[tokio::test]
async fn test_remove_is_idempotent_and_closes_once() {
    let registry = registry();
    let closes = Arc::new(AtomicUsize::new(0));
    let transport = CountingTransport {
        writes: Arc::default(),
        closes: Arc::clone(&closes),
    };
    let session = registry.create(Box::new(transport), None).await.unwrap();
    let id = session.id();

    assert!(registry.remove(id));
    assert!(!registry.remove(id));
    assert!(!registry.remove(id));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(registry.lookup(id).is_none());

    // Closing the session directly after removal does not close again.
    assert!(!session.close());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_closed_first_is_not_closed_again_by_remove() {
    let registry = registry();
    let closes = Arc::new(AtomicUsize::new(0));
    let transport = CountingTransport {
        writes: Arc::default(),
        closes: Arc::clone(&closes),
    };
    let session = registry.create(Box::new(transport), None).await.unwrap();

    assert!(session.close());
    assert!(registry.remove(session.id()));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ids_are_unique_across_many_sessions() {
    let registry = Arc::new(registry());
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry
                .create(Box::new(CountingTransport::default()), None)
                .await
                .unwrap()
                .id()
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(registry.len(), 16);
}

#[tokio::test]
async fn test_send_to_removed_session_is_not_found() {
    let registry = registry();
    let writes = Arc::new(AtomicUsize::new(0));
    let transport = CountingTransport {
        writes: Arc::clone(&writes),
        closes: Arc::default(),
    };
    let session = registry.create(Box::new(transport), None).await.unwrap();
    let id = session.id();

    registry.send_to(id, Bytes::from_static(b"x")).unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    registry.remove(id);
    assert!(matches!(
        registry.send_to(id, Bytes::from_static(b"x")),
        Err(ProtocolError::SessionNotFound(missing)) if missing == id
    ));
    assert!(matches!(
        registry.send_to(ConnectionId::new(u64::MAX), Bytes::new()),
        Err(ProtocolError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_close_all_then_empty() {
    let registry = registry();
    for _ in 0..3 {
        registry
            .create(Box::new(CountingTransport::default()), None)
            .await
            .unwrap();
    }
    assert_eq!(registry.connection_ids().len(), 3);
    assert_eq!(registry.close_all(), 3);
    assert!(registry.is_empty());
    assert_eq!(registry.close_all(), 0);
}
