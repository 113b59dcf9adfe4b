//! Event processor boundary.
//!
//! The dispatcher and workers are agnostic to what handling an event means.
//! They call [`EventProcessor::apply`] and ignore the outcome; reporting
//! failures is the processor's job.
//!
//! Provided implementations:
//! - [`CommandProcessor`]: runs the hook's command as a subprocess
//! - [`EventWriter`]: an [`EventUpdater`] that feeds events back into the job
//!   queue while its [`UpdateGate`] is open

use std::future::Future;

use crate::types::HookEvent;

pub mod command;
pub mod updater;

pub use command::{CommandProcessor, ProcessError};
pub use updater::{EventWriter, UpdateGate};

/// Performs the side effect for a dispatched event.
///
/// Called synchronously from a worker: the worker does not take another event
/// until the returned future completes. Errors are not observed by the caller.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct CountingProcessor(AtomicUsize);
///
/// impl EventProcessor for CountingProcessor {
///     async fn apply(&self, _event: HookEvent) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
/// ```
pub trait EventProcessor: Send + Sync + 'static {
    fn apply(&self, event: HookEvent) -> impl Future<Output = ()> + Send;
}

/// Sends events somewhere for further handling, best effort.
pub trait EventUpdater {
    fn send(&self, event: HookEvent);
}
