//! Append: list accumulation (message history, past steps).

use serde_json::Value;

use super::{Channel, ChannelError};

/// Concatenates writes onto a list. An array write is spliced in element by element,
/// any other non-null write is pushed as one element, null is ignored. Writes are
/// applied in the order the engine hands them over (node registration order).
#[derive(Debug, Clone, Default)]
pub struct Append;

impl Append {
    pub fn new() -> Self {
        Self
    }
}

impl Channel for Append {
    fn channel_type(&self) -> &'static str {
        "Append"
    }

    fn initial(&self) -> Option<Value> {
        Some(Value::Array(Vec::new()))
    }

    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError> {
        let mut items = match value.take() {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => vec![other],
        };
        let before = items.len();
        for w in writes {
            match w {
                Value::Array(more) => items.extend(more),
                Value::Null => {}
                single => items.push(single),
            }
        }
        let changed = items.len() != before;
        *value = Some(Value::Array(items));
        Ok(changed)
    }
}
