//! Bounded pool for CPU-bound crypto work.
//!
//! Prime generation and modular exponentiation run on tokio's blocking
//! threads; a semaphore caps how many run at once so a burst of handshakes
//! cannot starve the runtime.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::constants::ERR_WORKER_CLOSED;
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone)]
pub struct CryptoPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl CryptoPool {
    /// Pool running at most `workers` jobs concurrently. Zero is bumped to one.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs that could start right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ProtocolError::WorkerFailure(ERR_WORKER_CLOSED.into()))?;

        trace!(available = self.permits.available_permits(), "Crypto job started");
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ProtocolError::WorkerFailure(e.to_string()))
    }

    /// Stop handing out permits; queued and future jobs fail.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for CryptoPool {
    fn default() -> Self {
        Self::new(4)
    }
}
