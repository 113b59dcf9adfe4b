//! Dispatcher configuration.
//!
//! # Environment
//!
//! - `HOOKQ_MAX_WORKERS`: number of workers (default 4)
//! - `HOOKQ_PARTITIONS`: number of partitions (defaults to the worker count)
//! - `HOOKQ_QUEUE_CAPACITY`: job queue capacity (default 100)
//!
//! Every partition must be served by exactly one worker, so the partition count
//! must equal the worker count. [`DispatcherConfig::validate`] enforces this
//! before anything starts.

use thiserror::Error;

use crate::types::PartitionCount;

use super::queue::DEFAULT_QUEUE_CAPACITY;

/// Default number of workers.
pub const DEFAULT_MAX_WORKERS: u32 = 4;

const ENV_MAX_WORKERS: &str = "HOOKQ_MAX_WORKERS";
const ENV_PARTITIONS: &str = "HOOKQ_PARTITIONS";
const ENV_QUEUE_CAPACITY: &str = "HOOKQ_QUEUE_CAPACITY";

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("partition count must be at least 1")]
    ZeroPartitions,

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    /// Some partitions would have no worker, or some workers no partition.
    #[error("partition count {partitions} does not match worker count {workers}")]
    PartitionMismatch { partitions: u32, workers: u32 },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Result type for configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the dispatcher and its job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of workers started.
    pub max_workers: u32,

    /// Number of partitions events are hashed into.
    pub partition_count: u32,

    /// Capacity of the job queue.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl DispatcherConfig {
    /// Creates a configuration with one partition per worker.
    pub fn new(max_workers: u32) -> Self {
        DispatcherConfig {
            max_workers,
            partition_count: max_workers,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_partition_count(mut self, partition_count: u32) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`. Missing values use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_workers = parse_var(&lookup, ENV_MAX_WORKERS)?.unwrap_or(DEFAULT_MAX_WORKERS);
        let partition_count = parse_var(&lookup, ENV_PARTITIONS)?.unwrap_or(max_workers);
        let queue_capacity =
            parse_var(&lookup, ENV_QUEUE_CAPACITY)?.unwrap_or(DEFAULT_QUEUE_CAPACITY);

        Ok(DispatcherConfig {
            max_workers,
            partition_count,
            queue_capacity,
        })
    }

    /// Checks the configuration and returns the validated partition count.
    pub fn validate(&self) -> Result<PartitionCount> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        let partitions =
            PartitionCount::new(self.partition_count).ok_or(ConfigError::ZeroPartitions)?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.partition_count != self.max_workers {
            return Err(ConfigError::PartitionMismatch {
                partitions: self.partition_count,
                workers: self.max_workers,
            });
        }
        Ok(partitions)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
