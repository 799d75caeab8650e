//! Channel-backed job queue

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{Mutex, mpsc};

use super::{JobQueue, QueueError};

/// Producer half of a [`ChannelQueue`]
///
/// Dropping every producer closes the queue.
#[derive(Clone)]
pub struct QueueProducer {
    sender: mpsc::Sender<PathBuf>,
}

impl QueueProducer {
    /// Enqueues a job file, waiting for room if the queue is full
    ///
    /// Returns `false` if all consumers are gone.
    pub async fn enqueue(&self, job_file: PathBuf) -> bool {
        self.sender.send(job_file).await.is_ok()
    }
}

/// Bounded multi-consumer queue
///
/// The receiver sits behind an async mutex: whichever worker holds the lock
/// receives the next item, so no two workers ever get the same reference.
pub struct ChannelQueue {
    receiver: Mutex<mpsc::Receiver<PathBuf>>,
}

impl ChannelQueue {
    /// Creates a queue holding at most `capacity` pending references
    pub fn new(capacity: usize) -> (QueueProducer, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            QueueProducer { sender },
            Self {
                receiver: Mutex::new(receiver),
            },
        )
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn dequeue(&self) -> Result<Option<PathBuf>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}
