//! Per-connection session state.
//!
//! A session owns a write/close capability for its socket, the handshake state
//! and whatever identity the client has proven. Sending branches on the
//! handshake state: before RC4 is armed frames go out as-is, afterwards every
//! frame is enciphered on a private copy.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::crypto::encryption::{EncryptionContext, HandshakePhase};
use crate::error::constants::{
    ERR_ENCRYPTION_LOCK, ERR_NO_ENCRYPTION, ERR_OUTBOUND_QUEUE_FULL,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::outgoing::OutgoingMessage;
use crate::service::identity::UserIdentity;

/// Opaque id of one live connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write and close capability for one connection.
pub trait Transport: Send + Sync {
    /// Queue a finished wire frame. Must not block.
    fn write(&self, frame: Bytes) -> Result<()>;

    /// Fails the way `write` would if it were called now.
    fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Begin closing the connection. Called at most once per session.
    fn close(&self);
}

/// Transport backed by a bounded queue drained by the socket writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<Bytes>, shutdown: CancellationToken) -> Self {
        Self { tx, shutdown }
    }

    /// Transport plus the receiving half of its queue and its close token.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        (Self::new(tx, shutdown.clone()), rx, shutdown)
    }
}

impl Transport for ChannelTransport {
    fn ready(&self) -> Result<()> {
        if self.shutdown.is_cancelled() || self.tx.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        if self.tx.capacity() == 0 {
            return Err(ProtocolError::TransportError(ERR_OUTBOUND_QUEUE_FULL.into()));
        }
        Ok(())
    }

    fn write(&self, frame: Bytes) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ProtocolError::TransportError(ERR_OUTBOUND_QUEUE_FULL.into()),
            TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

pub struct Session {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    transport: Box<dyn Transport>,
    encryption: Mutex<Option<EncryptionContext>>,
    identity: RwLock<Option<UserIdentity>>,
    machine_id: RwLock<String>,
    closing: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("handshake_finished", &self.is_handshake_finished())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        id: ConnectionId,
        transport: Box<dyn Transport>,
        encryption: Option<EncryptionContext>,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            peer,
            transport,
            encryption: Mutex::new(encryption),
            identity: RwLock::new(None),
            machine_id: RwLock::new(String::new()),
            closing: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    // A panic while holding the lock cannot leave the context half-updated,
    // so a poisoned lock is safe to keep using.
    fn encryption(&self) -> MutexGuard<'_, Option<EncryptionContext>> {
        match self.encryption.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(connection_id = %self.id, "{}", ERR_ENCRYPTION_LOCK);
                poisoned.into_inner()
            }
        }
    }

    /// Send a finished frame, enciphering a copy if the handshake is done.
    ///
    /// The cipher step and the enqueue happen under one lock so keystream
    /// order always matches wire order. The keystream only advances for a
    /// frame the transport has room for; if an enciphered frame is lost
    /// anyway the session is closed, since the peer can no longer decipher.
    pub fn send(&self, frame: Bytes) -> Result<()> {
        if self.is_closing() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut encryption = self.encryption();
        let ctx = match encryption.as_mut() {
            Some(ctx) if ctx.is_handshake_finished() => ctx,
            _ => return self.transport.write(frame),
        };

        self.transport.ready()?;
        let mut copy = BytesMut::from(&frame[..]);
        ctx.apply(&mut copy);
        if let Err(e) = self.transport.write(copy.freeze()) {
            drop(encryption);
            warn!(connection_id = %self.id, error = %e, "Enciphered frame lost, closing session");
            self.close();
            return Err(e);
        }
        Ok(())
    }

    pub fn send_message<M: OutgoingMessage>(&self, message: &M) -> Result<()> {
        self.send(message.to_frame()?)
    }

    /// Decipher inbound bytes in place. Returns false, leaving the bytes
    /// untouched, while the handshake is unfinished.
    pub fn decipher(&self, bytes: &mut [u8]) -> bool {
        match self.encryption().as_mut() {
            Some(ctx) => ctx.apply(bytes),
            None => false,
        }
    }

    /// Run `f` against the encryption context.
    pub fn with_encryption<R>(&self, f: impl FnOnce(&mut EncryptionContext) -> R) -> Result<R> {
        let mut encryption = self.encryption();
        let ctx = encryption
            .as_mut()
            .ok_or_else(|| ProtocolError::HandshakeError(ERR_NO_ENCRYPTION.into()))?;
        Ok(f(ctx))
    }

    /// Send `frame` in plaintext, then arm RC4 with `shared_key`.
    ///
    /// Both steps happen under the encryption lock, so no other frame can slip
    /// in between them in either direction.
    pub fn complete_handshake(&self, frame: Bytes, shared_key: &[u8]) -> Result<()> {
        let mut encryption = self.encryption();
        let ctx = encryption
            .as_mut()
            .ok_or_else(|| ProtocolError::HandshakeError(ERR_NO_ENCRYPTION.into()))?;

        if ctx.phase() != HandshakePhase::DhRequested {
            return Err(ProtocolError::HandshakeError(format!(
                "cannot complete handshake in phase {:?}",
                ctx.phase()
            )));
        }

        self.transport.write(frame)?;
        ctx.arm(shared_key)?;
        debug!(connection_id = %self.id, "Handshake complete, traffic now enciphered");
        Ok(())
    }

    pub fn is_handshake_finished(&self) -> bool {
        self.encryption()
            .as_ref()
            .is_some_and(EncryptionContext::is_handshake_finished)
    }

    pub fn handshake_phase(&self) -> Option<HandshakePhase> {
        self.encryption().as_ref().map(EncryptionContext::phase)
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.identity
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_identity(&self, user: UserIdentity) {
        *self.identity.write().unwrap_or_else(|p| p.into_inner()) = Some(user);
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn machine_id(&self) -> String {
        self.machine_id
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_machine_id(&self, machine_id: impl Into<String>) {
        *self.machine_id.write().unwrap_or_else(|p| p.into_inner()) = machine_id.into();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Close the transport. Only the first call has any effect; returns
    /// whether this call was it.
    pub fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!(connection_id = %self.id, "Closing session");
        self.transport.close();
        true
    }
}
