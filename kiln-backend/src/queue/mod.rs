//! Job queue layer
//!
//! The queue hands each job file reference to exactly one worker. Delivery
//! is at-most-once: a reference taken by a worker that dies before
//! finishing is not handed out again.
//!
//! All queues are trait-based so workers can be driven by a channel in
//! production and by scripted queues in tests.

mod channel;
mod spool;

pub use channel::{ChannelQueue, QueueProducer};
pub use spool::Spool;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`JobQueue::dequeue`]
#[derive(Debug, Error)]
pub enum QueueError {
    /// Temporary failure; the caller should retry
    #[allow(dead_code)]
    #[error("Transient queue error: {0}")]
    Transient(String),
}

/// Shared hand-off point between the job producer and the workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Takes the next job file reference
    ///
    /// Blocks until a reference is available. Returns `Ok(None)` once the
    /// queue is closed and drained.
    async fn dequeue(&self) -> Result<Option<PathBuf>, QueueError>;
}
