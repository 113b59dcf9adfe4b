//! Partition-aware dispatch of hook events to a fixed worker pool.
//!
//! The dispatcher starts one worker per partition label, then runs a routing
//! loop that pulls events off the job queue and hands each to the worker whose
//! label equals the event's partition. Events for the same hook are therefore
//! serialized on one worker, while different hooks run in parallel across up to
//! `max_workers` lanes.
//!
//! # Architecture
//!
//! ```text
//!                                           ┌──────────────┐
//!                                      ┌──► │ lane 0 (idle │ ──► Worker-0
//!  ┌──────────┐   ┌────────────────┐   │    │  ticket)     │
//!  │ JobQueue │──►│ routing loop   │───┤    └──────────────┘
//!  │ (bounded)│   │ crc32(hook) % N│   │    ┌──────────────┐
//!  └──────────┘   └────────────────┘   └──► │ lane 1       │ ──► Worker-1
//!       ▲           one routing task        └──────────────┘
//!       │           per event
//!   producers
//! ```
//!
//! # Shutdown
//!
//! The routing loop, every pending routing task and every idle worker watch the
//! same cancellation token. Once it fires no new delivery begins; events still
//! being routed are dropped and counted as abandoned, events still queued stay
//! in the queue. Busy workers finish their current event. [`Dispatcher::wait`]
//! returns when everything has exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, instrument, trace, warn};

use crate::processor::EventProcessor;
use crate::types::PartitionCount;

use super::config::{ConfigError, DispatcherConfig};
use super::counter::{WORKER_PREFIX, WorkerCounter};
use super::pool::{Delivery, WorkerPool};
use super::queue::{JobQueue, JobReceiver};
use super::worker::{Worker, WorkerHandle};

/// Errors that can occur when starting a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Another dispatcher already consumes this queue.
    #[error("job queue already has a dispatcher attached")]
    QueueAlreadyClaimed,
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Events taken off the queue.
    pub routed: u64,
    /// Events handed to a worker.
    pub delivered: u64,
    /// Events dropped while being routed: shutdown fired first, or no
    /// worker serves their partition.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    routed: AtomicU64,
    delivered: AtomicU64,
    abandoned: AtomicU64,
}

/// Running dispatcher and its worker pool.
///
/// Dropping the dispatcher does not stop anything; cancel the shutdown token
/// (or call [`shutdown`](Dispatcher::shutdown)) to stop routing and workers.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    workers: Vec<WorkerHandle>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Validates `config`, starts `max_workers` workers and the routing loop.
    ///
    /// Returns once setup is done; routing runs in the background. Must be
    /// called from within a tokio runtime.
    pub fn start<P: EventProcessor>(
        config: DispatcherConfig,
        queue: &JobQueue,
        processor: Arc<P>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        Self::start_with_counter(
            config,
            queue,
            processor,
            shutdown,
            Arc::new(WorkerCounter::new()),
        )
    }

    /// Like [`start`](Dispatcher::start), naming workers from a shared counter.
    #[instrument(
        skip_all,
        fields(workers = config.max_workers, partitions = config.partition_count)
    )]
    pub fn start_with_counter<P: EventProcessor>(
        config: DispatcherConfig,
        queue: &JobQueue,
        processor: Arc<P>,
        shutdown: CancellationToken,
        counter: Arc<WorkerCounter>,
    ) -> Result<Self> {
        let partitions = config.validate()?;
        let jobs = queue.take_receiver().ok_or(DispatchError::QueueAlreadyClaimed)?;

        if queue.capacity() != config.queue_capacity {
            warn!(
                configured = config.queue_capacity,
                actual = queue.capacity(),
                "Job queue capacity differs from configuration"
            );
        }
        info!(queue_capacity = queue.capacity(), "Queue dispatcher starting");

        let tracker = TaskTracker::new();
        let pool = Arc::new(WorkerPool::new(config.max_workers as usize));

        let workers: Vec<WorkerHandle> = (0u32..)
            .zip(pool.lane_senders())
            .map(|(label, lane)| {
                let name = counter.next_name(WORKER_PREFIX);
                Worker::new(name, label, lane, Arc::clone(&processor), &shutdown).start(&tracker)
            })
            .collect();

        let counters = Arc::new(Counters::default());
        let router = Router {
            pool,
            partitions,
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
            counters: Arc::clone(&counters),
        };
        tracker.spawn(router.run(jobs).instrument(info_span!(parent: None, "router")));

        Ok(Dispatcher {
            config,
            workers,
            shutdown,
            tracker,
            counters,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Handles to the workers, in label order.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Returns the worker serving `label`.
    pub fn worker(&self, label: u32) -> Option<&WorkerHandle> {
        self.workers.get(label as usize)
    }

    /// Asks one worker to exit once idle. Returns false for an unknown label.
    ///
    /// Its partition is not served again until the dispatcher is restarted.
    pub fn stop_worker(&self, label: u32) -> bool {
        match self.worker(label) {
            Some(handle) => {
                info!(worker = handle.name(), label, "Stopping worker");
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Waits for the routing loop, routing tasks and workers to exit.
    ///
    /// Only returns after the shutdown token is cancelled (or every producer
    /// handle of the queue is dropped and all workers are stopped).
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Cancels the shutdown token and waits for everything to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher");
        self.shutdown.cancel();
        self.wait().await;
        info!(stats = ?self.stats(), "Dispatcher stopped");
    }
}

/// State moved into the routing loop.
struct Router {
    pool: Arc<WorkerPool>,
    partitions: PartitionCount,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl Router {
    async fn run(self, mut jobs: JobReceiver) {
        info!("Routing loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Job reader going to stop for terminate or kill");
                    break;
                }
                event = jobs.recv() => event,
            };
            let Some(event) = event else {
                info!("Job queue closed, routing loop stopping");
                break;
            };

            let partition = event.partition(self.partitions);
            self.counters.routed.fetch_add(1, Ordering::Relaxed);
            debug!(
                request = %event.request_id(),
                hook = %event.hook_id(),
                partition,
                "New job ticket"
            );

            // Route on a separate task so waiting for a busy worker never
            // holds up the next event.
            let pool = Arc::clone(&self.pool);
            let shutdown = self.shutdown.clone();
            let counters = Arc::clone(&self.counters);
            self.tracker.spawn(async move {
                match pool.deliver(partition, event, &shutdown).await {
                    Delivery::Delivered { worker } => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        trace!(worker = %worker, partition, "Hook event delivered");
                    }
                    Delivery::Abandoned(event) => {
                        counters.abandoned.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            request = %event.request_id(),
                            hook = %event.hook_id(),
                            partition,
                            "Shutdown while routing, hook event dropped"
                        );
                    }
                    Delivery::Unroutable(event) => {
                        counters.abandoned.fetch_add(1, Ordering::Relaxed);
                        error!(
                            request = %event.request_id(),
                            hook = %event.hook_id(),
                            partition,
                            "No worker serves partition, hook event dropped"
                        );
                    }
                }
            });
        }
    }
}
