//! # Services
//!
//! Collaborators the network core talks to but does not own.
//!
//! ## Components
//! - **Events**: best-effort broadcast of parsed inbound messages
//! - **Identity**: SSO ticket to user resolution

pub mod events;
pub mod identity;

pub use events::{ClientEvent, EventBus};
pub use identity::{IdentityResolver, InMemoryIdentityResolver, UserIdentity};
