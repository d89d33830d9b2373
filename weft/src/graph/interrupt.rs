//! Suspension payloads.
//!
//! A node suspends by returning `NodeOutput::Suspend(payload)`. The engine records an
//! [`Interrupt`] as the task's `__interrupt__` write and ends the run as suspended.
//! `CompiledStateGraph::resume` re-runs the same task with the resume value in its context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A suspended task and the payload it surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Node that suspended.
    pub node: String,
    /// Task id, unique per (checkpoint, node).
    pub task_id: String,
    /// Opaque payload, e.g. the question to ask the user.
    pub value: Value,
}

impl Interrupt {
    pub fn new(node: impl Into<String>, task_id: impl Into<String>, value: Value) -> Self {
        Self {
            node: node.into(),
            task_id: task_id.into(),
            value,
        }
    }
}
