//! # Error Types
//!
//! Error handling for the game protocol core.
//!
//! This module defines all error variants that can occur while framing packets,
//! running the legacy handshake, routing messages and driving sockets.
//!
//! ## Error Categories
//! - **Frame Errors**: truncated or malformed frames. The frame is dropped, the
//!   connection stays open.
//! - **Crypto Errors**: padding mismatches, missing key material, prime
//!   exhaustion, bad DH parameters. Fatal to the handshake in progress, so the
//!   connection is closed.
//! - **Registry Errors**: unknown connection ids. Benign no-ops.
//! - **Handler Errors**: business handler failures, isolated per packet.
//! - **Transport Errors**: socket failures that start the close sequence.
//!
//! No error text is ever written back to the remote peer.
//!
//! ## Example Usage
//! ```rust
//! use habbo_protocol::error::{FrameError, ProtocolError, Result};
//! use tracing::warn;
//!
//! fn check_frame(bytes: &[u8]) -> Result<()> {
//!     if bytes.len() < 6 {
//!         return Err(FrameError::Truncated { available: bytes.len() }.into());
//!     }
//!     Ok(())
//! }
//!
//! if let Err(e) = check_frame(&[0, 0]) {
//!     warn!(error = %e, "Dropping frame");
//!     assert!(!e.is_fatal());
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::transport::session::ConnectionId;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Session-related error messages
    pub const ERR_ENCRYPTION_LOCK: &str = "Encryption context lock poisoned";
    pub const ERR_NO_ENCRYPTION: &str = "Session has no encryption context";
    pub const ERR_OUTBOUND_QUEUE_FULL: &str = "Outbound queue full";

    /// Handshake-specific errors
    pub const ERR_HANDSHAKE_FINISHED: &str = "Handshake already completed";
    pub const ERR_EMPTY_PUBLIC_KEY: &str = "Client public key is empty";
    pub const ERR_EMPTY_SHARED_KEY: &str = "Generated shared key is empty";
    pub const ERR_ZERO_PEER_KEY: &str = "Decrypted public key is zero";

    /// Worker pool errors
    pub const ERR_WORKER_CLOSED: &str = "Crypto worker pool closed";
}

/// Failures while unframing or composing wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: {available} bytes available, at least 6 required")]
    Truncated { available: usize },

    #[error("Invalid frame length {declared} for {available} available bytes")]
    InvalidLength { declared: usize, available: usize },

    #[error("Frame of {declared} bytes exceeds limit of {limit} bytes")]
    Oversized { declared: usize, limit: usize },

    #[error("String of {0} bytes does not fit a 16-bit length prefix")]
    StringTooLong(usize),
}

/// Failures in the RSA / Diffie-Hellman / RC4 primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("PKCS#1 padding mismatch: expected type {expected}, found {found}")]
    PaddingMismatch { expected: u8, found: u8 },

    #[error("PKCS#1 padding is missing its zero separator")]
    MalformedPadding,

    #[error("Private key not available")]
    PrivateKeyUnavailable,

    #[error("Failed to generate prime after {attempts} attempts")]
    PrimeGenerationExhausted { attempts: usize },

    #[error("Invalid Diffie-Hellman parameters: {0}")]
    InvalidDhParameters(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Data was not in blocks of {block_size} bytes, total {length}")]
    InvalidBlockLength { block_size: usize, length: usize },

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("RC4 key must not be empty")]
    EmptyKey,

    #[error("Modulus cannot be zero")]
    ZeroModulus,

    #[error("Diffie-Hellman parameters were already adopted")]
    ParametersAlreadyAdopted,
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Session not found: {0}")]
    SessionNotFound(ConnectionId),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Handler for packet {0} panicked")]
    HandlerPanicked(u16),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Worker failure: {0}")]
    WorkerFailure(String),
}

impl ProtocolError {
    /// Whether the error leaves the connection in a state that cannot recover.
    ///
    /// A broken handshake means the two keystreams can never line up again.
    /// A failed write means the peer may have missed bytes it needed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Crypto(_)
                | ProtocolError::HandshakeError(_)
                | ProtocolError::TransportError(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::Io(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_errors_are_fatal() {
        let err: ProtocolError = CryptoError::PrivateKeyUnavailable.into();
        assert!(err.is_fatal());
        assert!(ProtocolError::HandshakeError("bad".into()).is_fatal());
    }

    #[test]
    fn transport_failures_are_fatal() {
        assert!(ProtocolError::TransportError(constants::ERR_OUTBOUND_QUEUE_FULL.into()).is_fatal());
        assert!(ProtocolError::ConnectionClosed.is_fatal());
    }

    #[test]
    fn frame_and_handler_errors_are_recoverable() {
        let err: ProtocolError = FrameError::Truncated { available: 3 }.into();
        assert!(!err.is_fatal());
        assert!(!ProtocolError::Handler("boom".into()).is_fatal());
        assert!(!ProtocolError::SessionNotFound(ConnectionId::new(7)).is_fatal());
    }

    #[test]
    fn padding_mismatch_reports_both_bytes() {
        let msg = CryptoError::PaddingMismatch {
            expected: 2,
            found: 1,
        }
        .to_string();
        assert!(msg.contains("expected type 2"));
        assert!(msg.contains("found 1"));
    }
}
