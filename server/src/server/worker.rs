//! Worker pools for blocking request handlers
//!
//! Slide decoding and cache I/O block, so every dispatched command runs on
//! tokio's blocking thread pool. `UnboundedPool` starts a job for every
//! request as it arrives; `BoundedPool` caps the number of jobs running at
//! once and queues the rest.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::debug;

use super::dispatch::Reply;

/// A request handler ready to run to completion
pub type Job = Box<dyn FnOnce() -> Reply + Send + 'static>;

/// Failures of the pool itself, never of the job's own logic
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker panicked or was cancelled: {0}")]
    Join(#[from] JoinError),

    #[error("Worker pool is closed")]
    Closed,
}

/// Runs jobs off the async runtime
#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn run(&self, job: Job) -> Result<Reply, WorkerError>;
}

/// One blocking task per request, with no admission limit
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedPool;

#[async_trait]
impl WorkerPool for UnboundedPool {
    async fn run(&self, job: Job) -> Result<Reply, WorkerError> {
        Ok(tokio::task::spawn_blocking(job).await?)
    }
}

/// At most `size` jobs run at once; later requests wait for a free slot
#[derive(Debug, Clone)]
pub struct BoundedPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BoundedPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently taken by a running job
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl WorkerPool for BoundedPool {
    async fn run(&self, job: Job) -> Result<Reply, WorkerError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Closed)?;

        // The permit moves into the task so it is held until the job ends,
        // even if the waiting request is dropped.
        let reply = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?;
        Ok(reply)
    }
}

/// Pool matching the configured worker limit
pub fn pool_for(max_workers: Option<usize>) -> Arc<dyn WorkerPool> {
    match max_workers {
        Some(size) => {
            debug!("Using bounded worker pool of {}", size);
            Arc::new(BoundedPool::new(size))
        }
        None => {
            debug!("Using unbounded worker pool");
            Arc::new(UnboundedPool)
        }
    }
}
