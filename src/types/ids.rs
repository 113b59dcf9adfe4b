//! Newtype wrappers for hook and request identifiers.
//!
//! These types prevent accidental mixing of the two identifiers (e.g., partitioning
//! on a request ID where the hook ID is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity of a hook definition.
///
/// Events sharing a `HookId` are always routed to the same worker lane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookId(pub String);

impl HookId {
    pub fn new(s: impl Into<String>) -> Self {
        HookId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HookId {
    fn from(s: String) -> Self {
        HookId(s)
    }
}

impl From<&str> for HookId {
    fn from(s: &str) -> Self {
        HookId(s.to_string())
    }
}

/// The identity of a triggering request.
///
/// Used only for logging and correlation; it plays no part in routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(s: impl Into<String>) -> Self {
        RequestId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}
