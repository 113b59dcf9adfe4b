//! Shared counter for naming workers.
//!
//! Worker labels are the construction index; this counter only hands out
//! human-readable names. It can be shared between successive dispatchers so
//! names stay unique for the life of the process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Key and name prefix used for workers.
pub const WORKER_PREFIX: &str = "Worker";

/// Keyed counter guarded by a reader/writer lock.
#[derive(Debug, Default)]
pub struct WorkerCounter {
    values: RwLock<HashMap<String, u32>>,
}

impl WorkerCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value for `key` without changing it.
    pub fn get(&self, key: &str) -> u32 {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Increments the value for `key` and returns the new value.
    pub fn increment(&self, key: &str) -> u32 {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let value = values.entry(key.to_string()).or_insert(0);
        *value += 1;
        *value
    }

    /// Returns the next name for `prefix`: `"{prefix}-0"`, `"{prefix}-1"`, ...
    pub fn next_name(&self, prefix: &str) -> String {
        let n = self.increment(prefix) - 1;
        format!("{prefix}-{n}")
    }
}
