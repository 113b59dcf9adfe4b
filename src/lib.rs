//! hookq - partitioned dispatch of hook events to a fixed worker pool.
//!
//! Events for the same hook always run on the same worker, one at a time;
//! events for different hooks run concurrently.

pub mod processor;
pub mod shutdown;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;
