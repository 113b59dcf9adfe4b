//! Partitioned worker pool for hook event processing.
//!
//! Events are pushed onto a bounded [`JobQueue`]; the [`Dispatcher`] routes each
//! one to the worker whose label equals the event's partition. Events sharing a
//! hook identity are processed one at a time on the same worker, while events
//! for different hooks run concurrently.
//!
//! # Module Structure
//!
//! - [`queue`]: bounded job queue and its one-time initializer
//! - [`pool`]: idle-worker registry indexed by label
//! - [`worker`]: the per-label worker loop
//! - [`counter`]: worker naming counter
//! - [`config`]: dispatcher configuration
//! - [`dispatch`]: worker startup and the routing loop

pub mod config;
pub mod counter;
pub mod dispatch;
pub mod pool;
pub mod queue;
#[allow(clippy::module_inception)]
pub mod worker;


pub use config::{ConfigError, DEFAULT_MAX_WORKERS, DispatcherConfig};
pub use counter::{WORKER_PREFIX, WorkerCounter};
pub use dispatch::{DispatchError, Dispatcher, DispatcherStats};
pub use pool::{Delivery, IdleTicket, WorkerPool};
pub use queue::{DEFAULT_QUEUE_CAPACITY, JobQueue, JobReceiver, QueueCell, QueueError};
pub use worker::{Worker, WorkerHandle, WorkerState};
