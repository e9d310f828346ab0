//! Per-connection encryption state.
//!
//! ```text
//! Uninitialized --(init DH)--> DhRequested --(complete DH)--> DhCompleted
//! ```
//!
//! RC4 is present exactly when the phase is `DhCompleted`; there is no way back.

use std::sync::Arc;

use tracing::debug;

use crate::crypto::diffie_hellman::DiffieHellman;
use crate::crypto::rc4::Rc4;
use crate::crypto::rsa::RsaCrypto;
use crate::error::constants::ERR_HANDSHAKE_FINISHED;
use crate::error::{CryptoError, ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Keys generated, nothing exchanged yet.
    Uninitialized,
    /// Signed prime and generator sent to the client.
    DhRequested,
    /// Shared secret derived, RC4 armed.
    DhCompleted,
}

#[derive(Debug)]
pub struct EncryptionContext {
    rsa: Arc<RsaCrypto>,
    diffie: DiffieHellman,
    rc4: Option<Rc4>,
    phase: HandshakePhase,
}

impl EncryptionContext {
    /// Generate a fresh DH key pair on top of the server's RSA identity.
    ///
    /// CPU heavy; run it on the crypto pool.
    pub fn new(rsa: Arc<RsaCrypto>) -> std::result::Result<Self, CryptoError> {
        let diffie = DiffieHellman::new(Arc::clone(&rsa))?;
        Ok(Self {
            rsa,
            diffie,
            rc4: None,
            phase: HandshakePhase::Uninitialized,
        })
    }

    pub fn rsa(&self) -> &Arc<RsaCrypto> {
        &self.rsa
    }

    pub fn diffie(&self) -> &DiffieHellman {
        &self.diffie
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn is_handshake_finished(&self) -> bool {
        self.rc4.is_some()
    }

    /// Record that the DH parameters went out. Repeating it is harmless.
    pub fn mark_dh_requested(&mut self) -> Result<()> {
        match self.phase {
            HandshakePhase::DhCompleted => {
                Err(ProtocolError::HandshakeError(ERR_HANDSHAKE_FINISHED.into()))
            }
            _ => {
                self.phase = HandshakePhase::DhRequested;
                Ok(())
            }
        }
    }

    /// Key RC4 with the shared secret and finish the handshake.
    pub fn arm(&mut self, shared_key: &[u8]) -> Result<()> {
        match self.phase {
            HandshakePhase::DhCompleted => {
                Err(ProtocolError::HandshakeError(ERR_HANDSHAKE_FINISHED.into()))
            }
            HandshakePhase::Uninitialized => Err(ProtocolError::HandshakeError(
                "DH parameters were never requested".into(),
            )),
            HandshakePhase::DhRequested => {
                self.rc4 = Some(Rc4::new(shared_key)?);
                self.phase = HandshakePhase::DhCompleted;
                debug!(key_len = shared_key.len(), "RC4 armed");
                Ok(())
            }
        }
    }

    /// Run `bytes` through RC4 in place. Returns false, leaving the bytes
    /// untouched, before the handshake has finished.
    pub fn apply(&mut self, bytes: &mut [u8]) -> bool {
        match self.rc4.as_mut() {
            Some(rc4) => {
                rc4.parse(bytes);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crypto::rsa::tests::test_key;

    fn context() -> EncryptionContext {
        EncryptionContext::new(Arc::new(test_key())).unwrap()
    }

    #[test]
    fn starts_unencrypted() {
        let mut ctx = context();
        assert_eq!(ctx.phase(), HandshakePhase::Uninitialized);
        assert!(!ctx.is_handshake_finished());
        let mut bytes = *b"plain";
        assert!(!ctx.apply(&mut bytes));
        assert_eq!(&bytes, b"plain");
    }

    #[test]
    fn arming_requires_request_first() {
        let mut ctx = context();
        assert!(ctx.arm(b"secret").is_err());
        assert!(!ctx.is_handshake_finished());
    }

    #[test]
    fn full_transition() {
        let mut ctx = context();
        ctx.mark_dh_requested().unwrap();
        ctx.mark_dh_requested().unwrap();
        assert_eq!(ctx.phase(), HandshakePhase::DhRequested);

        ctx.arm(b"secret").unwrap();
        assert_eq!(ctx.phase(), HandshakePhase::DhCompleted);
        assert!(ctx.is_handshake_finished());

        let mut bytes = *b"plain";
        assert!(ctx.apply(&mut bytes));
        assert_ne!(&bytes, b"plain");

        assert!(ctx.arm(b"again").is_err());
        assert!(ctx.mark_dh_requested().is_err());
    }

    #[test]
    fn empty_secret_leaves_context_unarmed() {
        let mut ctx = context();
        ctx.mark_dh_requested().unwrap();
        assert!(matches!(
            ctx.arm(&[]),
            Err(ProtocolError::Crypto(CryptoError::EmptyKey))
        ));
        assert_eq!(ctx.phase(), HandshakePhase::DhRequested);
    }
}
