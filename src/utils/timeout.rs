//! Timeout constants and async timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Idle time after which a connection is closed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// TCP keep-alive probe interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a half-closed connection may linger before it is dropped.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Delay before the accept loop is rebuilt after a listener failure.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Interval between server status lines.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on draining connections at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `future`, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
