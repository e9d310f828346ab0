use crate::core::packet::{ClientPacket, HEADER_LEN};
use crate::error::constants::{ERR_DISPATCHER_READ_LOCK, ERR_DISPATCHER_WRITE_LOCK};
use crate::error::{ProtocolError, Result};
use crate::protocol::incoming::IncomingMessage;
use crate::service::events::{ClientEvent, EventBus};
use crate::transport::session::Session;
use crate::utils::metrics::Metrics;
use futures::future::{BoxFuture, FutureExt};
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Bytes of payload shown when logging an unknown packet.
const UNKNOWN_PREVIEW_LEN: usize = 30;

pub type HandlerFuture = BoxFuture<'static, Result<()>>;

type HandlerFn = dyn Fn(Arc<Session>, ClientPacket) -> HandlerFuture + Send + Sync + 'static;

struct Route {
    name: Cow<'static, str>,
    handler: Arc<HandlerFn>,
}

/// What became of one dispatched packet.
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled,
    /// No handler for the header id. The packet was logged and dropped.
    Unknown,
    /// The handler returned an error or panicked.
    Failed(ProtocolError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled)
    }
}

/// Routes inbound packets to handlers by header id.
///
/// A failing or panicking handler only costs its own packet: the error is
/// logged with a hex dump and handed back to the caller, which decides whether
/// the connection survives.
pub struct Dispatcher {
    routes: RwLock<HashMap<u16, Route>>,
    events: EventBus,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.headers())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(events: EventBus, metrics: Arc<Metrics>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            events,
            metrics,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a raw handler. A second registration for the same header
    /// replaces the first.
    pub fn register_handler<F>(
        &self,
        header: u16,
        name: impl Into<Cow<'static, str>>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Arc<Session>, ClientPacket) -> HandlerFuture + Send + Sync + 'static,
    {
        let name = name.into();
        let mut routes = self
            .routes
            .write()
            .map_err(|_| ProtocolError::Handler(ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        if let Some(previous) = routes.get(&header) {
            warn!(header, previous = %previous.name, name = %name, "Replacing packet handler");
        }
        routes.insert(
            header,
            Route {
                name,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Register a typed handler. The packet is parsed into `M` and published
    /// on the event bus before `handler` runs.
    pub fn register<M, F, Fut>(&self, handler: F) -> Result<()>
    where
        M: IncomingMessage,
        F: Fn(Arc<Session>, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let events = self.events.clone();
        self.register_handler(M::HEADER, M::NAME, move |session, mut packet| {
            let message = M::parse(&mut packet);
            events.publish(ClientEvent {
                connection_id: session.id(),
                message: message.clone().into(),
            });
            handler(session, message).boxed()
        })
    }

    /// Parse and publish `M` with no further handling.
    pub fn register_publisher<M: IncomingMessage>(&self) -> Result<()> {
        self.register::<M, _, _>(|_session, _message| futures::future::ready(Ok(())))
    }

    pub fn headers(&self) -> Vec<u16> {
        let mut headers: Vec<u16> = match self.routes.read() {
            Ok(routes) => routes.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        headers.sort_unstable();
        headers
    }

    pub fn is_registered(&self, header: u16) -> bool {
        self.routes
            .read()
            .map(|routes| routes.contains_key(&header))
            .unwrap_or(false)
    }

    /// Run the handler for one packet to completion.
    pub async fn handle(&self, session: &Arc<Session>, packet: ClientPacket) -> DispatchOutcome {
        let header = packet.header();
        self.metrics.frame_received();

        let route = match self.routes.read() {
            Ok(routes) => routes
                .get(&header)
                .map(|route| (route.name.clone(), Arc::clone(&route.handler))),
            Err(_) => {
                return DispatchOutcome::Failed(ProtocolError::Handler(
                    ERR_DISPATCHER_READ_LOCK.to_string(),
                ))
            }
        };

        let Some((name, handler)) = route else {
            self.metrics.unknown_header();
            let payload = packet.payload();
            let preview = hex::encode(&payload[..payload.len().min(UNKNOWN_PREVIEW_LEN)]);
            info!(
                connection_id = %session.id(),
                header,
                length = payload.len() + HEADER_LEN,
                preview = %preview,
                "Unknown packet"
            );
            return DispatchOutcome::Unknown;
        };

        let retained = packet.clone();
        let session = Arc::clone(session);
        let connection_id = session.id();
        let run = AssertUnwindSafe(async move { handler(session, packet).await });

        let error = match run.catch_unwind().await {
            Ok(Ok(())) => {
                debug!(connection_id = %connection_id, header, name = %name, "Packet handled");
                return DispatchOutcome::Handled;
            }
            Ok(Err(e)) => e,
            Err(_) => ProtocolError::HandlerPanicked(header),
        };

        self.metrics.handler_failure();
        warn!(
            connection_id = %connection_id,
            header,
            name = %name,
            error = %error,
            packet = %retained.dump_hex(),
            "Packet handler failed"
        );
        DispatchOutcome::Failed(error)
    }
}
