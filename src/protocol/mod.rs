//! # Protocol Layer
//!
//! Message ids, typed messages and routing.
//!
//! ## Components
//! - **Headers**: inbound and outbound message ids
//! - **Incoming / Outgoing**: typed message payloads
//! - **Dispatcher**: header id to handler routing with failure isolation
//! - **Auth**: handshake, SSO and fingerprint handlers

pub mod auth;
pub mod dispatcher;
pub mod headers;
pub mod incoming;
pub mod outgoing;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use incoming::{InboundMessage, IncomingMessage};
pub use outgoing::OutgoingMessage;
