//! Trigger channels (`branch:to:<node>`): written when an edge points at a node.

use serde_json::Value;

use super::{Channel, ChannelError};

pub const TRIGGER_PREFIX: &str = "branch:to:";

/// Name of the channel that schedules `node`.
pub fn trigger_channel(node: &str) -> String {
    format!("{}{}", TRIGGER_PREFIX, node)
}

/// Any write marks the node as scheduled; only the version bump matters to the engine.
#[derive(Debug, Clone, Default)]
pub struct Trigger;

impl Channel for Trigger {
    fn channel_type(&self) -> &'static str {
        "Trigger"
    }

    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError> {
        if writes.is_empty() {
            return Ok(false);
        }
        *value = Some(Value::Bool(true));
        Ok(true)
    }
}
