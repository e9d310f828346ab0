//! Authentication bootstrap handlers.
//!
//! The client walks through three steps before it can do anything useful:
//!
//! ```text
//! 586  InitDiffieHandshake      -> 771  signed prime + generator
//! 2616 CompleteDiffieHandshake  -> 3777 signed server public key, then RC4 on
//! 53   SsoTicket                -> identity attached, or session closed
//! ```
//!
//! RSA and modular exponentiation run on the crypto pool so a slow handshake
//! never holds up another connection's reads.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::crypto::encryption::HandshakePhase;
use crate::error::constants::ERR_HANDSHAKE_FINISHED;
use crate::error::{CryptoError, ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::incoming::{
    ClientHello, CompleteDiffieHandshake, InitDiffieHandshake, PerformanceLog, SsoTicket,
    UniqueId, VersionCheck,
};
use crate::protocol::outgoing::{
    CompleteDiffieHandshakeEvent, InitDiffieHandshakeEvent, OutgoingMessage,
};
use crate::service::identity::IdentityResolver;
use crate::transport::registry::SessionRegistry;
use crate::transport::session::Session;
use crate::utils::metrics::{Metrics, Timer};

pub struct AuthHandlers {
    registry: Arc<SessionRegistry>,
    identity: Arc<dyn IdentityResolver>,
    metrics: Arc<Metrics>,
}

impl AuthHandlers {
    pub fn new(
        registry: Arc<SessionRegistry>,
        identity: Arc<dyn IdentityResolver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            identity,
            metrics,
        }
    }

    /// Install every bootstrap handler on `dispatcher`.
    pub fn register(self: &Arc<Self>, dispatcher: &Dispatcher) -> Result<()> {
        dispatcher.register_publisher::<ClientHello>()?;
        dispatcher.register_publisher::<PerformanceLog>()?;
        dispatcher.register_publisher::<VersionCheck>()?;

        let this = Arc::clone(self);
        dispatcher.register::<InitDiffieHandshake, _, _>(move |session, _message| {
            let this = Arc::clone(&this);
            async move { this.init_diffie_handshake(session).await }
        })?;

        let this = Arc::clone(self);
        dispatcher.register::<CompleteDiffieHandshake, _, _>(move |session, message| {
            let this = Arc::clone(&this);
            async move { this.complete_diffie_handshake(session, message).await }
        })?;

        let this = Arc::clone(self);
        dispatcher.register::<SsoTicket, _, _>(move |session, message| {
            let this = Arc::clone(&this);
            async move { this.sso_ticket(session, message).await }
        })?;

        dispatcher.register::<UniqueId, _, _>(|session, message| async move {
            debug!(connection_id = %session.id(), "Machine id received");
            session.set_machine_id(message.machine_id);
            Ok(())
        })?;

        Ok(())
    }

    #[instrument(skip_all, fields(connection_id = %session.id()))]
    async fn init_diffie_handshake(&self, session: Arc<Session>) -> Result<()> {
        if session.is_handshake_finished() {
            warn!("{}, ignoring parameter request", ERR_HANDSHAKE_FINISHED);
            return Ok(());
        }

        let diffie = session.with_encryption(|ctx| ctx.diffie().clone())?;
        let (signed_prime, signed_generator) = self
            .registry
            .pool()
            .run(move || -> std::result::Result<_, CryptoError> {
                Ok((diffie.signed_prime()?, diffie.signed_generator()?))
            })
            .await??;

        session.with_encryption(|ctx| ctx.mark_dh_requested())??;
        session.send_message(&InitDiffieHandshakeEvent {
            signed_prime,
            signed_generator,
        })?;
        debug!("Sent DH parameters");
        Ok(())
    }

    #[instrument(skip_all, fields(connection_id = %session.id()))]
    async fn complete_diffie_handshake(
        &self,
        session: Arc<Session>,
        message: CompleteDiffieHandshake,
    ) -> Result<()> {
        if session.is_handshake_finished() {
            warn!("{}, ignoring second completion", ERR_HANDSHAKE_FINISHED);
            return Ok(());
        }

        self.metrics.handshake_attempt();
        match self.finish_handshake(&session, message.client_public_key).await {
            Ok(()) => {
                self.metrics.handshake_success();
                info!("Handshake completed");
                Ok(())
            }
            Err(e) => {
                self.metrics.handshake_failed();
                Err(e)
            }
        }
    }

    async fn finish_handshake(&self, session: &Session, client_public_key: String) -> Result<()> {
        let _timer = Timer::start("complete_diffie_handshake");
        let (phase, diffie) =
            session.with_encryption(|ctx| (ctx.phase(), ctx.diffie().clone()))?;
        if phase != HandshakePhase::DhRequested {
            return Err(ProtocolError::HandshakeError(format!(
                "public key received in phase {phase:?}"
            )));
        }

        let (shared_key, server_public_key) = self
            .registry
            .pool()
            .run(move || -> std::result::Result<_, CryptoError> {
                Ok((
                    diffie.shared_key(&client_public_key)?,
                    diffie.signed_public_key()?,
                ))
            })
            .await??;

        let frame = CompleteDiffieHandshakeEvent { server_public_key }.to_frame()?;
        session.complete_handshake(frame, &shared_key)
    }

    #[instrument(skip_all, fields(connection_id = %session.id()))]
    async fn sso_ticket(&self, session: Arc<Session>, message: SsoTicket) -> Result<()> {
        if message.ticket.is_empty() {
            warn!("Empty SSO ticket, closing session");
            self.registry.remove(session.id());
            return Ok(());
        }

        match self.identity.resolve_user(&message.ticket).await {
            Ok(Some(user)) => {
                info!(user_id = user.id, username = %user.username, "Session authenticated");
                session.set_identity(user);
            }
            Ok(None) => {
                warn!("Unknown SSO ticket, closing session");
                self.registry.remove(session.id());
            }
            Err(e) => {
                warn!(error = %e, "Identity lookup failed, closing session");
                self.registry.remove(session.id());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandlers")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
