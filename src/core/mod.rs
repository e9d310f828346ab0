//! # Core Protocol Components
//!
//! Low-level packet handling: framing, typed field readers and the outbound
//! composer.
//!
//! ## Components
//! - **Packet**: inbound reader over one unframed message
//! - **Composer**: outbound frame builder
//! - **Codec**: `decode()`, tokio codec and per-connection reassembly
//!
//! ## Wire Format
//! ```text
//! [Length(4, BE)] [Header(2, BE)] [Payload(Length - 2)]
//! ```
//!
//! ## Limits
//! - Maximum frame size: 8 KiB by default, configurable
//! - Length validation before any allocation

pub mod codec;
pub mod composer;
pub mod packet;
