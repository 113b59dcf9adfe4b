//! Shared test utilities: event builders and instrumented processors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};

use crate::processor::EventProcessor;
use crate::types::{Hook, HookEvent, PartitionCount, Request, RequestId, partition_for};

/// Upper bound for any wait in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn event(hook: &str, request: &str) -> HookEvent {
    HookEvent::new(Hook::new(hook, "/bin/true"), Request::new(request))
}

/// Finds a hook ID that lands on `partition` out of `partitions`.
pub fn hook_for_partition(partition: u32, partitions: u32) -> String {
    let count = PartitionCount::new(partitions).unwrap();
    (0..)
        .map(|i| format!("hook-{i}"))
        .find(|id| partition_for(id, count) == partition)
        .unwrap()
}

#[derive(Debug, Default)]
struct Recorded {
    requests: Vec<RequestId>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
    total_in_flight: usize,
    max_total_in_flight: usize,
}

/// Processor that records what it handled and how much ran concurrently.
#[derive(Debug)]
pub struct RecordingProcessor {
    delay: Duration,
    panic_on: Option<String>,
    recorded: Mutex<Recorded>,
    processed: watch::Sender<usize>,
}

impl Default for RecordingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingProcessor {
    pub fn new() -> Self {
        RecordingProcessor {
            delay: Duration::ZERO,
            panic_on: None,
            recorded: Mutex::new(Recorded::default()),
            processed: watch::channel(0).0,
        }
    }

    /// Each event takes `delay` to process.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panics when handling events for `hook`.
    pub fn panicking_on(hook: &str) -> Self {
        RecordingProcessor {
            panic_on: Some(hook.to_string()),
            ..Self::new()
        }
    }

    pub fn processed(&self) -> usize {
        *self.processed.borrow()
    }

    pub fn requests(&self) -> Vec<RequestId> {
        self.recorded.lock().unwrap().requests.clone()
    }

    /// Most events for `hook` that were ever in flight at once.
    pub fn max_in_flight(&self, hook: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .max_in_flight
            .get(hook)
            .copied()
            .unwrap_or(0)
    }

    /// Most events of any hook that were ever in flight at once.
    pub fn max_total_in_flight(&self) -> usize {
        self.recorded.lock().unwrap().max_total_in_flight
    }

    /// Waits until at least `n` events were processed. Returns false on timeout.
    pub async fn wait_for(&self, n: usize) -> bool {
        let mut rx = self.processed.subscribe();
        tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(|count| *count >= n))
            .await
            .is_ok()
    }
}

impl EventProcessor for RecordingProcessor {
    async fn apply(&self, event: HookEvent) {
        let hook = event.hook_id().to_string();
        if self.panic_on.as_deref() == Some(hook.as_str()) {
            panic!("processor failure for {hook}");
        }

        {
            let mut recorded = self.recorded.lock().unwrap();
            let current = {
                let n = recorded.in_flight.entry(hook.clone()).or_insert(0);
                *n += 1;
                *n
            };
            let max = recorded.max_in_flight.entry(hook.clone()).or_insert(0);
            *max = (*max).max(current);
            recorded.total_in_flight += 1;
            recorded.max_total_in_flight = recorded
                .max_total_in_flight
                .max(recorded.total_in_flight);
        }

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        {
            let mut recorded = self.recorded.lock().unwrap();
            if let Some(n) = recorded.in_flight.get_mut(&hook) {
                *n -= 1;
            }
            recorded.total_in_flight -= 1;
            recorded.requests.push(event.request_id().clone());
        }

        self.processed.send_modify(|count| *count += 1);
    }
}

/// Processor that blocks every event until released.
#[derive(Debug)]
pub struct GatedProcessor {
    gate: Semaphore,
    started: watch::Sender<usize>,
    finished: AtomicUsize,
}

impl Default for GatedProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedProcessor {
    pub fn new() -> Self {
        GatedProcessor {
            gate: Semaphore::new(0),
            started: watch::channel(0).0,
            finished: AtomicUsize::new(0),
        }
    }

    /// Lets `n` more events finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn started(&self) -> usize {
        *self.started.borrow()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` events have started. Panics on timeout.
    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(|count| *count >= n))
            .await
            .expect("timed out waiting for processor to start")
            .unwrap();
    }
}

impl EventProcessor for GatedProcessor {
    async fn apply(&self, _event: HookEvent) {
        self.started.send_modify(|count| *count += 1);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}
