//! # habbo-protocol
//!
//! Network core for a legacy virtual-world game server.
//!
//! Frames are length-prefixed and big-endian. After an RSA-authenticated
//! Diffie-Hellman exchange every byte in both directions runs through a
//! session-wide RC4 stream.
//!
//! ```text
//! socket -> FrameAssembler (lazy RC4) -> Dispatcher -> handlers
//!        <- ChannelTransport <- Session::send (RC4 once armed) <-
//! ```
//!
//! ## Modules
//! - [`core`]: frame codec, inbound reader, outbound composer
//! - [`crypto`]: bigint helpers, RSA, DH, RC4 and the handshake state
//! - [`protocol`]: message ids, typed messages, dispatcher, auth handlers
//! - [`transport`]: sessions, registry and the TCP server
//! - [`service`]: event bus and identity resolution
//! - [`config`], [`error`], [`utils`]: the supporting stack

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use error::{ProtocolError, Result};
pub use transport::{GameServer, SessionRegistry};
