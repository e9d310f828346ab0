//! # Transport Layer
//!
//! Sockets, sessions and the table that ties connection ids to them.
//!
//! ## Components
//! - **Session**: per-connection state and the `Transport` write/close seam
//! - **Registry**: the live session table, the only state shared across tasks
//! - **Server**: accept loop plus per-connection read and write tasks
//!
//! ## Connection Lifecycle
//! ```text
//! accept -> keepalive + nodelay -> DH keys generated -> read/dispatch loop
//!        -> remove from registry -> half-close -> forced close after grace
//! ```

pub mod registry;
pub mod server;
pub mod session;

pub use registry::SessionRegistry;
pub use server::{start_server, GameServer};
pub use session::{ChannelTransport, ConnectionId, Session, Transport};
