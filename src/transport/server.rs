//! TCP front end.
//!
//! One accept loop, one task per connection. Each connection task reads,
//! reassembles and dispatches frames in arrival order, while a companion
//! writer task drains the session's outbound queue onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{NetworkConfig, ServerConfig};
use crate::core::codec::FrameAssembler;
use crate::crypto::rsa::RsaCrypto;
use crate::error::{CryptoError, ProtocolError, Result};
use crate::protocol::auth::AuthHandlers;
use crate::protocol::dispatcher::{DispatchOutcome, Dispatcher};
use crate::service::events::EventBus;
use crate::service::identity::IdentityResolver;
use crate::transport::registry::SessionRegistry;
use crate::transport::session::{ChannelTransport, Session};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;
use crate::utils::worker::CryptoPool;

/// Size of a single socket read.
const READ_BUFFER_SIZE: usize = 8192;

/// How often shutdown checks whether connections have drained.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    IdleTimeout,
    ReadError,
    WriteError,
    SessionClosed,
    HandshakeFailed,
    TransportFailed,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::ReadError => "read error",
            CloseReason::WriteError => "write error",
            CloseReason::SessionClosed => "session closed",
            CloseReason::HandshakeFailed => "handshake failed",
            CloseReason::TransportFailed => "transport failed",
        }
    }
}

/// Everything a connection task needs, cheap to clone per accept.
#[derive(Clone)]
struct ConnectionContext {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

pub struct GameServer {
    ctx: ConnectionContext,
    events: EventBus,
}

impl std::fmt::Debug for GameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("address", &self.ctx.config.address)
            .field("sessions", &self.ctx.registry.len())
            .finish_non_exhaustive()
    }
}

impl GameServer {
    /// Build the server from validated configuration.
    ///
    /// Fails when the configuration is invalid or the RSA identity has no
    /// private exponent; the server cannot sign its DH parameters without one.
    pub fn new(config: &NetworkConfig, identity: Arc<dyn IdentityResolver>) -> Result<Self> {
        config.validate_strict()?;

        let crypto = &config.crypto;
        let rsa = RsaCrypto::from_hex(
            &crypto.rsa_public_exponent,
            &crypto.rsa_modulus,
            crypto.rsa_private_exponent.as_deref(),
        )?;
        if !rsa.has_private_key() {
            return Err(CryptoError::PrivateKeyUnavailable.into());
        }

        let metrics = Arc::new(Metrics::new());
        let pool = CryptoPool::new(config.server.crypto_workers);
        let registry = Arc::new(SessionRegistry::new(Arc::new(rsa), pool));
        let events = EventBus::default();
        let dispatcher = Arc::new(Dispatcher::new(events.clone(), Arc::clone(&metrics)));

        Arc::new(AuthHandlers::new(
            Arc::clone(&registry),
            identity,
            Arc::clone(&metrics),
        ))
        .register(&dispatcher)?;

        Ok(Self {
            ctx: ConnectionContext {
                config: Arc::new(config.server.clone()),
                registry,
                dispatcher,
                metrics,
            },
            events,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.ctx.dispatcher
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Listen on the configured address until Ctrl-C.
    #[instrument(skip(self), fields(address = %self.ctx.config.address))]
    pub async fn start(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.start_with_shutdown(shutdown_rx).await
    }

    /// Listen on the configured address until `shutdown_rx` fires.
    pub async fn start_with_shutdown(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.ctx.config.address).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Run the accept loop on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        let local = listener.local_addr()?;
        info!(address = %local, "Game server listening");

        let mut status = tokio::time::interval(self.ctx.config.status_interval);
        status.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    self.shutdown().await;
                    return Ok(());
                }

                _ = status.tick() => {
                    info!(
                        listening = %local,
                        connections = self.ctx.registry.len(),
                        "Server status"
                    );
                    self.ctx.metrics.log_metrics();
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = self.ctx.clone();
                        tokio::spawn(handle_connection(ctx, stream, peer));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed, restarting accept loop");
                        self.ctx.metrics.connection_error();
                        tokio::time::sleep(self.ctx.config.restart_delay).await;
                    }
                },
            }
        }
    }

    async fn shutdown(&self) {
        info!("Shutting down server. Waiting for connections to close...");
        self.ctx.registry.close_all();

        let timeout = tokio::time::sleep(self.ctx.config.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            let active = self.ctx.metrics.snapshot().connections_active;
            if active == 0 {
                info!("All connections closed, shutting down");
                break;
            }
            tokio::select! {
                _ = &mut timeout => {
                    warn!(connections = active, "Shutdown timeout reached, forcing exit");
                    break;
                }
                _ = tokio::time::sleep(SHUTDOWN_POLL_INTERVAL) => {
                    debug!(connections = active, "Waiting for connections to close");
                }
            }
        }
        self.ctx.registry.pool().close();
    }
}

/// Bind `host:port` and serve until Ctrl-C.
#[instrument(skip(config, identity))]
pub async fn start_server(
    host: &str,
    port: u16,
    config: &NetworkConfig,
    identity: Arc<dyn IdentityResolver>,
) -> Result<()> {
    let mut config = config.clone();
    config.server.address = format!("{host}:{port}");
    GameServer::new(&config, identity)?.start().await
}

fn configure_socket(stream: &TcpStream, keepalive: Duration) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(keepalive))
}

#[instrument(skip(ctx, stream), fields(peer = %peer))]
async fn handle_connection(ctx: ConnectionContext, stream: TcpStream, peer: SocketAddr) {
    ctx.metrics.connection_established();
    if let Err(e) = configure_socket(&stream, ctx.config.keepalive_interval) {
        warn!(error = %e, "Failed to configure socket");
    }

    let (mut reader, writer) = stream.into_split();
    let (transport, outbound, closed) = ChannelTransport::channel(ctx.config.backpressure_limit);

    // Waiting for a crypto worker counts against the idle timeout.
    let created = with_timeout_error(
        ctx.registry.create(Box::new(transport), Some(peer)),
        ctx.config.connection_timeout,
    )
    .await;
    let session = match created {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to set up session");
            ctx.metrics.connection_error();
            ctx.metrics.connection_closed();
            return;
        }
    };
    info!(connection_id = %session.id(), "Connection accepted");

    let write_failed = CancellationToken::new();
    let mut writer_task = tokio::spawn(write_loop(
        writer,
        outbound,
        closed.clone(),
        write_failed.clone(),
        Arc::clone(&ctx.metrics),
    ));

    let reason = read_loop(&ctx, &session, &mut reader, &closed, &write_failed).await;

    // Registry first, so nothing else can reach the session while it closes.
    ctx.registry.remove(session.id());
    // A peer that stops reading can park the writer in `write_all`.
    match tokio::time::timeout(ctx.config.close_grace_period, &mut writer_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Writer task failed"),
        Err(_) => {
            debug!(connection_id = %session.id(), "Writer stuck, aborting");
            writer_task.abort();
        }
    }

    // The writer half-closed the socket; give the peer a moment to finish.
    let drained = tokio::time::timeout(ctx.config.close_grace_period, async {
        let mut sink = [0u8; 512];
        while let Ok(n) = reader.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        debug!(connection_id = %session.id(), "Peer did not close in time, forcing close");
    }

    info!(connection_id = %session.id(), reason = reason.as_str(), "Connection closed");
    ctx.metrics.connection_closed();
}

async fn read_loop(
    ctx: &ConnectionContext,
    session: &Arc<Session>,
    reader: &mut OwnedReadHalf,
    closed: &CancellationToken,
    write_failed: &CancellationToken,
) -> CloseReason {
    let mut assembler = FrameAssembler::new(ctx.config.max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            _ = closed.cancelled() => return CloseReason::SessionClosed,
            _ = write_failed.cancelled() => return CloseReason::WriteError,
            read = tokio::time::timeout(ctx.config.connection_timeout, reader.read(&mut buf)) => read,
        };

        let n = match read {
            Err(_) => return CloseReason::IdleTimeout,
            Ok(Ok(0)) => return CloseReason::PeerClosed,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(connection_id = %session.id(), error = %e, "Read failed");
                ctx.metrics.connection_error();
                return CloseReason::ReadError;
            }
        };
        ctx.metrics.bytes_read(n as u64);
        assembler.extend(&buf[..n]);

        loop {
            let packet = match assembler.next_frame(|bytes| {
                session.decipher(bytes);
            }) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    warn!(connection_id = %session.id(), error = %e, "Dropping frame");
                    ctx.metrics.frame_dropped();
                    continue;
                }
            };

            if let DispatchOutcome::Failed(e) = ctx.dispatcher.handle(session, packet).await {
                match e {
                    ProtocolError::TransportError(_)
                    | ProtocolError::ConnectionClosed
                    | ProtocolError::Io(_) => {
                        warn!(connection_id = %session.id(), error = %e, "Transport failed, closing");
                        return CloseReason::TransportFailed;
                    }
                    e if e.is_fatal() => {
                        error!(connection_id = %session.id(), error = %e, "Handshake failed, closing");
                        return CloseReason::HandshakeFailed;
                    }
                    _ => {}
                }
            }
            if session.is_closing() {
                return CloseReason::SessionClosed;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
    write_failed: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_frame(&mut writer, &frame, &metrics).await {
                        warn!(error = %e, "Write failed");
                        write_failed.cancel();
                        return;
                    }
                }
                None => break,
            },

            _ = closed.cancelled() => {
                // Flush what was queued before the close.
                while let Ok(frame) = outbound.try_recv() {
                    if let Err(e) = write_frame(&mut writer, &frame, &metrics).await {
                        warn!(error = %e, "Write failed during close");
                        return;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Half-close failed");
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Bytes, metrics: &Metrics) -> Result<()> {
    writer.write_all(frame).await.map_err(ProtocolError::Io)?;
    metrics.frame_sent(frame.len() as u64);
    Ok(())
}
