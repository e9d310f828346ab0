//! Table of live sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::crypto::encryption::EncryptionContext;
use crate::crypto::rsa::RsaCrypto;
use crate::error::{ProtocolError, Result};
use crate::transport::session::{ConnectionId, Session, Transport};
use crate::utils::worker::CryptoPool;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Arc<Session>>>,
    next_id: AtomicU64,
    rsa: Arc<RsaCrypto>,
    pool: CryptoPool,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(rsa: Arc<RsaCrypto>, pool: CryptoPool) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            rsa,
            pool,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn pool(&self) -> &CryptoPool {
        &self.pool
    }

    /// Register a new connection.
    ///
    /// DH key generation runs on the crypto pool. If it fails the transport is
    /// closed and nothing is registered.
    pub async fn create(
        &self,
        transport: Box<dyn Transport>,
        peer: Option<SocketAddr>,
    ) -> Result<Arc<Session>> {
        let rsa = Arc::clone(&self.rsa);
        let encryption = match self.pool.run(move || EncryptionContext::new(rsa)).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                transport.close();
                return Err(e.into());
            }
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };

        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, transport, Some(encryption), peer));
        self.sessions().insert(id, Arc::clone(&session));
        debug!(connection_id = %id, peer = ?peer, "Session registered");
        Ok(session)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions().get(&id).cloned()
    }

    /// Drop the session and close its transport.
    ///
    /// Safe to call any number of times; only the call that actually removed
    /// the entry closes anything.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.sessions().remove(&id);
        match removed {
            Some(session) => {
                session.close();
                debug!(connection_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions().keys().copied().collect()
    }

    /// Send a frame to one connection by id.
    pub fn send_to(&self, id: ConnectionId, frame: Bytes) -> Result<()> {
        let session = self
            .lookup(id)
            .ok_or(ProtocolError::SessionNotFound(id))?;
        session.send(frame)
    }

    /// Send a frame to every live session. Returns how many accepted it.
    pub fn broadcast(&self, frame: &Bytes) -> usize {
        let sessions: Vec<_> = self.sessions().values().cloned().collect();
        sessions
            .iter()
            .filter(|session| match session.send(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(connection_id = %session.id(), error = %e, "Broadcast skipped session");
                    false
                }
            })
            .count()
    }

    /// Remove and close every session.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Closed all sessions");
        }
        drained.len()
    }
}
