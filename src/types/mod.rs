//! Core domain types for hook event dispatch.

pub mod event;
pub mod ids;

pub use event::{Hook, HookEvent, PartitionCount, Request, partition_for};
pub use ids::{HookId, RequestId};
