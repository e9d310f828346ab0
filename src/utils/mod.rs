//! # Utility Modules
//!
//! Supporting pieces shared across the server.
//!
//! ## Components
//! - **Logging**: subscriber setup for the binary
//! - **Metrics**: atomic counters with snapshots
//! - **Timeout**: default durations and async timeout wrappers
//! - **Worker**: bounded blocking pool for crypto work

pub mod logging;
pub mod metrics;
pub mod timeout;
pub mod worker;

pub use metrics::{Metrics, MetricsSnapshot};
pub use worker::CryptoPool;
