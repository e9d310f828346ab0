//! # Cryptography
//!
//! The legacy handshake primitives, implemented from scratch for
//! compatibility with the client rather than strength.
//!
//! ## Components
//! - **bigint**: modular exponentiation and probable primes
//! - **rsa**: block RSA with type 1 / type 2 padding
//! - **diffie_hellman**: 128-bit DH over RSA-wrapped integers
//! - **rc4**: the session stream cipher
//! - **encryption**: per-connection handshake state

pub mod bigint;
pub mod diffie_hellman;
pub mod encryption;
pub mod rc4;
pub mod rsa;

pub use diffie_hellman::DiffieHellman;
pub use encryption::{EncryptionContext, HandshakePhase};
pub use rc4::Rc4;
pub use rsa::RsaCrypto;
