//! Bounded pool for blocking provider calls.
//!
//! Jobs run on tokio's blocking threads; a semaphore caps how many run at once so a
//! stalled upstream cannot grow the thread count without bound. The caller awaits
//! the result without occupying a runtime worker.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task;
use tracing::error;

use crate::FetchError;

pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl BlockingPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` on a blocking thread once a worker slot is free.
    pub async fn run<T, F>(&self, job: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Worker(String::from("worker pool closed")))?;

        task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|join_error| {
            error!(error = %join_error, "blocking provider task failed");
            FetchError::Worker(join_error.to_string())
        })
    }
}
