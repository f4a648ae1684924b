//! Bounded work queue with explicit shutdown sentinels
//!
//! The push-style alternative to pull-style offset claiming: a producer
//! paginates the remote stream and enqueues [`WorkItem`] batches; consumer
//! workers dequeue and persist them. The queue is bounded so a fast producer
//! backpressures instead of ballooning memory, and overflow/underflow are
//! reported as distinct conditions rather than silently dropped.

use crate::{ContentRecord, ContentType};
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use std::time::Duration;

/// Work queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Queue is at capacity
    #[error("work queue is full")]
    Full,

    /// Queue has no items available
    #[error("work queue is empty")]
    Empty,

    /// All consumers or producers have disconnected
    #[error("work queue is disconnected")]
    Disconnected,

    /// A work item was constructed with no records
    #[error("work item must contain at least one record")]
    EmptyBatch,
}

/// A batch of records handed to exactly one consumer.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Content type of every record in the batch
    pub content_type: ContentType,
    /// Records fetched for this batch; never empty
    pub items: Vec<ContentRecord>,
    /// Zero-based batch sequence number assigned by the producer
    pub batch_number: u64,
    /// Whether the producer saw a short page when building this batch
    pub is_final_batch: bool,
}

impl WorkItem {
    /// Construct a batch; fails if `items` is empty.
    pub fn new(
        content_type: ContentType,
        items: Vec<ContentRecord>,
        batch_number: u64,
        is_final_batch: bool,
    ) -> Result<Self, QueueError> {
        if items.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        Ok(Self {
            content_type,
            items,
            batch_number,
            is_final_batch,
        })
    }
}

/// Bounded FIFO of work items with `None` reserved as the shutdown sentinel.
///
/// Cloning shares the same underlying channel, so a producer and its
/// consumers can each hold their own handle.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<Option<WorkItem>>,
    rx: Receiver<Option<WorkItem>>,
    capacity: usize,
}

impl WorkQueue {
    /// Create a queue bounded at `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Enqueue a work item, blocking while the queue is full.
    pub fn put_work(&self, item: WorkItem) -> Result<(), QueueError> {
        self.tx
            .send(Some(item))
            .map_err(|_| QueueError::Disconnected)
    }

    /// Enqueue a work item without blocking; fails with [`QueueError::Full`]
    /// when at capacity.
    pub fn try_put_work(&self, item: WorkItem) -> Result<(), QueueError> {
        self.tx.try_send(Some(item)).map_err(|err| match err {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }

    /// Enqueue with a bounded wait; fails with [`QueueError::Full`] when the
    /// timeout elapses with the queue still at capacity.
    pub fn put_work_timeout(&self, item: WorkItem, timeout: Duration) -> Result<(), QueueError> {
        self.tx
            .send_timeout(Some(item), timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => QueueError::Full,
                SendTimeoutError::Disconnected(_) => QueueError::Disconnected,
            })
    }

    /// Dequeue the next message, blocking while the queue is empty.
    /// `Ok(None)` is a stop sentinel: the consumer should exit its loop.
    pub fn get_work(&self) -> Result<Option<WorkItem>, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Disconnected)
    }

    /// Dequeue without blocking; fails with [`QueueError::Empty`] when no
    /// message is available.
    pub fn try_get_work(&self) -> Result<Option<WorkItem>, QueueError> {
        self.rx.try_recv().map_err(|err| match err {
            TryRecvError::Empty => QueueError::Empty,
            TryRecvError::Disconnected => QueueError::Disconnected,
        })
    }

    /// Dequeue with a bounded wait; fails with [`QueueError::Empty`] when the
    /// timeout elapses without a message.
    pub fn get_work_timeout(&self, timeout: Duration) -> Result<Option<WorkItem>, QueueError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => QueueError::Empty,
            RecvTimeoutError::Disconnected => QueueError::Disconnected,
        })
    }

    /// Enqueue exactly `count` stop sentinels so that `count` consumers each
    /// dequeue one and exit.
    pub fn send_stop_signals(&self, count: usize) -> Result<(), QueueError> {
        for _ in 0..count {
            self.tx.send(None).map_err(|_| QueueError::Disconnected)?;
        }
        Ok(())
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
