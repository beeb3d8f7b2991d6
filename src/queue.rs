//! Bounded relay queue between the debouncer and the sync engine.
//!
//! Producers never wait: when the buffer is full the newest change is dropped
//! and a warning is logged. Consumers wait for the next change or for the
//! pipeline's cancellation, whichever comes first.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::watcher::LogicalOperation;

/// Capacity used when none (or zero) is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A released change, owned by whichever consumer dequeues it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedChange {
    pub path: PathBuf,
    pub operation: LogicalOperation,
    pub observed_at: DateTime<Utc>,
}

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// The queue was full (or every consumer handle was dropped).
    Dropped,
}

/// Fixed-capacity, drop-newest queue.
#[derive(Clone)]
pub struct RelayQueue {
    sender: mpsc::Sender<QueuedChange>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedChange>>>,
}

impl RelayQueue {
    /// Create a queue holding at most `capacity` changes (0 means the default).
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Number of changes currently buffered.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer a change without waiting.
    pub fn enqueue(&self, change: QueuedChange) -> Enqueued {
        match self.sender.try_send(change) {
            Ok(()) => Enqueued::Accepted,
            Err(mpsc::error::TrySendError::Full(change)) => {
                crate::warn_event!(
                    "queue",
                    "full, dropping newest",
                    "capacity {}, {} {}",
                    self.capacity(),
                    change.operation,
                    change.path.display()
                );
                Enqueued::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(change)) => {
                crate::debug_event!("queue", "closed, dropping", "{}", change.path.display());
                Enqueued::Dropped
            }
        }
    }

    /// Handle for draining the queue. Handles may be cloned across tasks.
    pub fn consumer(&self) -> RelayConsumer {
        RelayConsumer {
            receiver: self.receiver.clone(),
        }
    }
}

/// Consume-only side of the relay queue.
#[derive(Clone)]
pub struct RelayConsumer {
    receiver: Arc<Mutex<mpsc::Receiver<QueuedChange>>>,
}

impl RelayConsumer {
    /// Wait for the next change.
    ///
    /// Returns `None` once `cancel` fires; anything still buffered stays in the
    /// queue and can be drained with [`try_dequeue`](Self::try_dequeue).
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<QueuedChange> {
        let mut receiver = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            change = receiver.recv() => change,
        }
    }

    /// Take a buffered change if one is immediately available.
    pub fn try_dequeue(&self) -> Option<QueuedChange> {
        let mut receiver = self.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }
}
