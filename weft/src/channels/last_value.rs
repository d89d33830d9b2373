//! LastValue: the last write of the superstep replaces the value.

use serde_json::Value;

use super::{Channel, ChannelError};

/// Keeps only the last written value. With several writers in one superstep the
/// writer registered last wins.
#[derive(Debug, Clone, Default)]
pub struct LastValue;

impl LastValue {
    pub fn new() -> Self {
        Self
    }
}

impl Channel for LastValue {
    fn channel_type(&self) -> &'static str {
        "LastValue"
    }

    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError> {
        match writes.into_iter().last() {
            Some(last) => {
                *value = Some(last);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
