//! Long-lived worker serving one partition label.
//!
//! # Event Loop
//!
//! 1. Advertise an idle ticket in the worker's registry lane
//! 2. Wait for whichever comes first: an event, shutdown, or an explicit stop
//! 3. On an event, run the processor to completion, then go back to 1
//!
//! A worker takes at most one event at a time. A busy worker is never
//! interrupted: shutdown and stop are only observed while idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span};

use crate::processor::EventProcessor;

use super::pool::IdleTicket;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered in the pool, waiting for an event.
    Idle,
    /// Running the event processor.
    Busy,
    /// Exited after shutdown or stop.
    Terminated,
}

/// A worker that has been constructed but not started.
pub struct Worker<P> {
    name: Arc<str>,
    label: u32,
    lane: mpsc::Sender<IdleTicket>,
    processor: Arc<P>,
    shutdown: CancellationToken,
    stop: CancellationToken,
    state: watch::Sender<WorkerState>,
    processed: Arc<AtomicU64>,
}

impl<P: EventProcessor> Worker<P> {
    /// Creates a worker for `label` that advertises itself on `lane`.
    ///
    /// The worker's stop signal is a child of `shutdown`, so it also fires
    /// when the whole dispatcher shuts down.
    pub fn new(
        name: impl Into<Arc<str>>,
        label: u32,
        lane: mpsc::Sender<IdleTicket>,
        processor: Arc<P>,
        shutdown: &CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Worker {
            name: name.into(),
            label,
            lane,
            processor,
            shutdown: shutdown.clone(),
            stop: shutdown.child_token(),
            state,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the worker's loop on `tracker` and returns a handle to it.
    pub fn start(self, tracker: &TaskTracker) -> WorkerHandle {
        let handle = WorkerHandle {
            name: Arc::clone(&self.name),
            label: self.label,
            stop: self.stop.clone(),
            state: self.state.subscribe(),
            processed: Arc::clone(&self.processed),
        };

        let span = info_span!(parent: None, "worker", worker = %self.name, label = self.label);
        tracker.spawn(self.run().instrument(span));

        handle
    }

    async fn run(self) {
        debug!("Worker started");

        loop {
            let (ticket, mut delivery) = IdleTicket::new(self.label, Arc::clone(&self.name));
            self.state.send_replace(WorkerState::Idle);

            let registered = tokio::select! {
                biased;
                _ = self.stop.cancelled() => false,
                sent = self.lane.send(ticket) => sent.is_ok(),
            };
            if !registered {
                break;
            }

            // Prefer an event that was already handed over to a stop that
            // races with it. Closing first makes any later hand-over fail
            // back to the router; one that got in before the close is kept.
            let event = tokio::select! {
                biased;
                event = &mut delivery => event.ok(),
                _ = self.stop.cancelled() => {
                    delivery.close();
                    delivery.try_recv().ok()
                }
            };
            let Some(event) = event else {
                break;
            };

            self.state.send_replace(WorkerState::Busy);
            debug!(
                request = %event.request_id(),
                hook = %event.hook_id(),
                "Worker doing job"
            );

            // Run on its own task so a panicking processor cannot take the
            // worker down with it.
            let processor = Arc::clone(&self.processor);
            let job = tokio::spawn(async move { processor.apply(event).await });
            if let Err(e) = job.await {
                error!(error = %e, "Event processor panicked");
            }
            self.processed.fetch_add(1, Ordering::Relaxed);
        }

        self.state.send_replace(WorkerState::Terminated);
        if self.shutdown.is_cancelled() {
            info!("Worker going to stop for terminate or kill");
        } else {
            info!("Worker going to quit");
        }
    }
}

/// Handle to a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    label: u32,
    stop: CancellationToken,
    state: watch::Receiver<WorkerState>,
    processed: Arc<AtomicU64>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The partition this worker serves.
    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    /// Number of events this worker has finished processing.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Asks the worker to exit once it is idle.
    ///
    /// Events routed to its partition afterwards are not served until shutdown.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
