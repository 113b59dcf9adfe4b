//! Hook events and their partition keys.
//!
//! A [`HookEvent`] pairs a hook definition with the request that triggered it.
//! Its partition is derived from the hook identity alone, so every event for one
//! hook lands on the same worker lane for a fixed partition count.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::{HookId, RequestId};

/// Number of partitions events are spread over.
///
/// Guaranteed non-zero, so computing a partition can never divide by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionCount(NonZeroU32);

impl PartitionCount {
    /// Returns `None` for a count of zero.
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(n) => Some(PartitionCount(n)),
            None => None,
        }
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for PartitionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Computes the partition for a hook identity.
///
/// CRC-32 (IEEE polynomial) over the UTF-8 bytes of `hook_id`, modulo the
/// partition count. Always in `[0, partitions)`.
pub fn partition_for(hook_id: &str, partitions: PartitionCount) -> u32 {
    crc32fast::hash(hook_id.as_bytes()) % partitions.get()
}

/// A hook definition as seen by the dispatcher and the command processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: HookId,

    /// Command to run. Absolute, or relative to `working_directory`, or a bare
    /// name looked up on `PATH`.
    #[serde(default)]
    pub execute_command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// Arguments passed to the command (not including the program itself).
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl Hook {
    pub fn new(id: impl Into<HookId>, execute_command: impl Into<String>) -> Self {
        Hook {
            id: id.into(),
            execute_command: execute_command.into(),
            working_directory: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }
}

/// The request that triggered a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Request {
    pub fn new(id: impl Into<RequestId>) -> Self {
        Request {
            id: id.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// The unit of work: a hook plus the request that triggered it.
///
/// Moved into the job queue on push, then into exactly one worker, and dropped
/// once the event processor returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub hook: Hook,
    pub request: Request,
}

impl HookEvent {
    pub fn new(hook: Hook, request: Request) -> Self {
        HookEvent { hook, request }
    }

    pub fn hook_id(&self) -> &HookId {
        &self.hook.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request.id
    }

    /// Returns the partition this event belongs to.
    pub fn partition(&self, partitions: PartitionCount) -> u32 {
        partition_for(self.hook.id.as_str(), partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn count(n: u32) -> PartitionCount {
        PartitionCount::new(n).unwrap()
    }

    #[test]
    fn zero_partitions_is_rejected() {
        assert!(PartitionCount::new(0).is_none());
        assert_eq!(PartitionCount::new(3).map(PartitionCount::get), Some(3));
    }

    #[test]
    fn partition_uses_crc32_ieee() {
        // Standard CRC-32/IEEE check value.
        assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);
        assert_eq!(partition_for("123456789", count(u32::MAX)), 0xCBF4_3926);
        assert_eq!(partition_for("123456789", count(10)), 0xCBF4_3926 % 10);
    }

    #[test]
    fn single_partition_is_always_zero() {
        for id in ["a", "repo-A", "", "ü"] {
            assert_eq!(partition_for(id, count(1)), 0);
        }
    }

    #[test]
    fn event_partition_ignores_request() {
        let a = HookEvent::new(Hook::new("deploy", "/bin/true"), Request::new("r1"));
        let b = HookEvent::new(
            Hook::new("deploy", "/bin/false"),
            Request::new("r2").with_payload(serde_json::json!({"ref": "main"})),
        );

        assert_eq!(a.partition(count(7)), b.partition(count(7)));
    }

    #[test]
    fn event_parses_from_json_line() {
        let line = r#"{"hook":{"id":"deploy","execute_command":"/usr/bin/env","arguments":["true"]},"request":{"id":"abc"}}"#;
        let event: HookEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.hook_id().as_str(), "deploy");
        assert_eq!(event.request_id().as_str(), "abc");
        assert_eq!(event.hook.arguments, vec!["true".to_string()]);
        assert_eq!(event.hook.working_directory, None);
        assert_eq!(event.request.payload, serde_json::Value::Null);
    }

    proptest! {
        #[test]
        fn partition_is_stable(id in ".{0,64}", n in 1u32..1024) {
            prop_assert_eq!(partition_for(&id, count(n)), partition_for(&id, count(n)));
        }

        #[test]
        fn partition_is_in_range(id in ".{0,64}", n in 1u32..1024) {
            prop_assert!(partition_for(&id, count(n)) < n);
        }
    }
}
