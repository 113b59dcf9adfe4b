//! Registry of idle workers, indexed by partition label.
//!
//! Each label owns one lane. A worker advertises itself as idle by placing an
//! [`IdleTicket`] in its lane; the ticket carries a one-shot channel that takes
//! exactly one event. A ticket is in the registry iff its worker is idle.
//!
//! Routing an event to partition `p` only ever looks at lane `p`, so a busy
//! target worker makes the router wait on that lane rather than cycling
//! through unrelated idle workers. Routers waiting on the same lane are served
//! in the order they started waiting. That is not necessarily queue order:
//! routing tasks run concurrently and may reach the lane in any order.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::types::HookEvent;

/// An idle worker's offer to take exactly one event.
#[derive(Debug)]
pub struct IdleTicket {
    label: u32,
    worker: Arc<str>,
    tx: oneshot::Sender<HookEvent>,
}

impl IdleTicket {
    /// Creates a ticket and the receiver the worker waits on.
    pub(crate) fn new(label: u32, worker: Arc<str>) -> (Self, oneshot::Receiver<HookEvent>) {
        let (tx, rx) = oneshot::channel();
        (IdleTicket { label, worker, tx }, rx)
    }

    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Hands the event to the worker. Fails, returning the event, if the
    /// worker stopped waiting.
    pub(crate) fn hand_over(self, event: HookEvent) -> Result<(), HookEvent> {
        self.tx.send(event)
    }
}

/// Outcome of routing one event.
#[derive(Debug)]
pub enum Delivery {
    /// The event was handed to the named worker.
    Delivered { worker: Arc<str> },

    /// Shutdown fired before a worker for the partition became idle.
    Abandoned(HookEvent),

    /// No lane exists for the partition.
    Unroutable(HookEvent),
}

#[derive(Debug)]
struct Lane {
    tx: mpsc::Sender<IdleTicket>,
    rx: Mutex<mpsc::Receiver<IdleTicket>>,
}

/// Fixed-size table of lanes, one per worker label.
#[derive(Debug)]
pub struct WorkerPool {
    lanes: Vec<Lane>,
}

impl WorkerPool {
    /// Creates lanes for labels `0..size`.
    pub fn new(size: usize) -> Self {
        let lanes = (0..size)
            .map(|_| {
                let (tx, rx) = mpsc::channel(1);
                Lane {
                    tx,
                    rx: Mutex::new(rx),
                }
            })
            .collect();

        WorkerPool { lanes }
    }

    pub fn size(&self) -> usize {
        self.lanes.len()
    }

    /// Senders workers use to advertise themselves, in label order.
    pub(crate) fn lane_senders(&self) -> impl Iterator<Item = mpsc::Sender<IdleTicket>> + '_ {
        self.lanes.iter().map(|lane| lane.tx.clone())
    }

    /// Delivers `event` to the worker serving `partition`.
    ///
    /// Waits until that worker is idle. Stale tickets (from a worker that
    /// stopped after advertising) are skipped. If `shutdown` fires first the
    /// event is handed back as [`Delivery::Abandoned`]; it is never
    /// delivered after that point.
    pub async fn deliver(
        &self,
        partition: u32,
        mut event: HookEvent,
        shutdown: &CancellationToken,
    ) -> Delivery {
        let Some(lane) = self.lanes.get(partition as usize) else {
            return Delivery::Unroutable(event);
        };

        let mut idle = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Delivery::Abandoned(event),
            guard = lane.rx.lock() => guard,
        };

        loop {
            let ticket = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Delivery::Abandoned(event),
                ticket = idle.recv() => ticket,
            };

            // The pool holds a sender for every lane, so the lane never closes.
            let Some(ticket) = ticket else {
                return Delivery::Unroutable(event);
            };

            let worker = Arc::clone(&ticket.worker);
            match ticket.hand_over(event) {
                Ok(()) => return Delivery::Delivered { worker },
                Err(returned) => {
                    trace!(worker = %worker, partition, "Skipping stale idle ticket");
                    event = returned;
                }
            }
        }
    }
}
