//! Bounded job queue feeding the dispatcher.
//!
//! Producers push [`HookEvent`]s; exactly one consumer (the dispatcher's routing
//! loop) drains them in FIFO order. A full queue makes producers wait rather than
//! drop events, which is the only backpressure in the system.
//!
//! The queue is an explicitly constructed value. [`QueueCell`] provides
//! one-time lazy initialization for callers that want "create on first use"
//! semantics without a hidden global.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::types::HookEvent;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Errors from a non-blocking push. The rejected event is handed back.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("job queue is full")]
    Full(HookEvent),

    /// The consumer side has been dropped.
    #[error("job queue is closed")]
    Closed(HookEvent),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Shared handle to a bounded job queue.
///
/// Cloning the handle does not create a new queue; all clones feed the same
/// buffer.
#[derive(Debug, Clone)]
pub struct JobQueue {
    inner: Arc<JobQueueInner>,
}

#[derive(Debug)]
struct JobQueueInner {
    tx: mpsc::Sender<HookEvent>,

    /// Consumer side, until the dispatcher claims it.
    rx: Mutex<Option<mpsc::Receiver<HookEvent>>>,
}

impl JobQueue {
    /// Creates a queue holding at most `capacity` pending events.
    ///
    /// A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        JobQueue {
            inner: Arc::new(JobQueueInner {
                tx,
                rx: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Enqueues an event, waiting while the queue is full.
    ///
    /// This wait is not cancellable from inside the queue; callers that need
    /// a deadline should race it against their own shutdown signal. If the
    /// consumer is gone the event is logged and dropped.
    pub async fn push(&self, event: HookEvent) {
        trace!(
            hook = %event.hook_id(),
            request = %event.request_id(),
            "Queueing hook event"
        );

        if let Err(mpsc::error::SendError(event)) = self.inner.tx.send(event).await {
            error!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                "Job queue closed, dropping hook event"
            );
        }
    }

    /// Enqueues an event without waiting.
    pub fn try_push(&self, event: HookEvent) -> Result<()> {
        self.inner.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => QueueError::Full(event),
            mpsc::error::TrySendError::Closed(event) => QueueError::Closed(event),
        })
    }

    /// Maximum number of pending events.
    pub fn capacity(&self) -> usize {
        self.inner.tx.max_capacity()
    }

    /// Number of events currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.inner.tx.max_capacity() - self.inner.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if both handles refer to the same queue.
    pub fn same_queue(&self, other: &JobQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Claims the consumer side. Only the first call returns `Some`.
    pub fn take_receiver(&self) -> Option<JobReceiver> {
        self.inner
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| JobReceiver { rx })
    }
}

/// Consumer side of a [`JobQueue`], owned by the dispatcher.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<HookEvent>,
}

impl JobReceiver {
    /// Waits for the next event. Returns `None` once every producer handle
    /// has been dropped and the buffer is empty.
    pub(crate) async fn recv(&mut self) -> Option<HookEvent> {
        self.rx.recv().await
    }
}

/// Lazily initialized, exactly-once job queue.
///
/// The first [`acquire`](QueueCell::acquire) creates the queue with the given
/// capacity; later calls return the same queue and ignore their capacity
/// argument, no matter how many callers race.
#[derive(Debug, Default)]
pub struct QueueCell {
    cell: OnceLock<JobQueue>,
}

impl QueueCell {
    pub const fn new() -> Self {
        QueueCell {
            cell: OnceLock::new(),
        }
    }

    pub fn acquire(&self, capacity: usize) -> JobQueue {
        self.cell
            .get_or_init(|| JobQueue::bounded(capacity))
            .clone()
    }

    /// Returns the queue if it has been created.
    pub fn get(&self) -> Option<&JobQueue> {
        self.cell.get()
    }
}
