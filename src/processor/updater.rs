//! Best-effort feedback of events into the job queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::types::HookEvent;
use crate::worker::{JobQueue, QueueError};

use super::EventUpdater;

/// On/off switch controlling whether an [`EventWriter`] forwards events.
///
/// Starts closed. Clones share the same switch.
#[derive(Debug, Clone, Default)]
pub struct UpdateGate {
    open: Arc<AtomicBool>,
}

impl UpdateGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Writes events back into a [`JobQueue`] without ever waiting.
///
/// Events are dropped when the gate is closed or the queue is full.
#[derive(Debug, Clone)]
pub struct EventWriter {
    gate: UpdateGate,
    queue: JobQueue,
}

impl EventWriter {
    pub fn new(queue: JobQueue, gate: UpdateGate) -> Self {
        EventWriter { gate, queue }
    }

    pub fn gate(&self) -> &UpdateGate {
        &self.gate
    }
}

impl EventUpdater for EventWriter {
    fn send(&self, event: HookEvent) {
        if !self.gate.is_open() {
            trace!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                "Updates disabled, dropping event"
            );
            return;
        }

        match self.queue.try_push(event) {
            Ok(()) => {}
            Err(QueueError::Full(event)) => {
                debug!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                "Job queue full, dropping update"
            );
            }
            Err(QueueError::Closed(event)) => {
                debug!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                "Job queue closed, dropping update"
            );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::event;

    #[test]
    fn gate_starts_closed_and_is_shared() {
        let gate = UpdateGate::new();
        let other = gate.clone();
        assert!(!gate.is_open());

        other.open();
        assert!(gate.is_open());

        gate.close();
        assert!(!other.is_open());
    }

    #[test]
    fn closed_gate_drops_events() {
        let queue = JobQueue::bounded(4);
        let writer = EventWriter::new(queue.clone(), UpdateGate::new());

        writer.send(event("hook", "r1"));

        assert!(queue.is_empty());
    }

    #[test]
    fn open_gate_forwards_events() {
        let queue = JobQueue::bounded(4);
        let gate = UpdateGate::new();
        let writer = EventWriter::new(queue.clone(), gate.clone());

        gate.open();
        writer.send(event("hook", "r1"));
        writer.send(event("hook", "r2"));

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn full_queue_drops_without_waiting() {
        let queue = JobQueue::bounded(1);
        let gate = UpdateGate::new();
        gate.open();
        let writer = EventWriter::new(queue.clone(), gate);

        writer.send(event("hook", "r1"));
        writer.send(event("hook", "r2"));

        assert_eq!(queue.len(), 1);
    }
}
