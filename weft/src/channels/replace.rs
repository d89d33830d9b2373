//! ReplaceIfPresent: replace only when the write carries a value.

use serde_json::Value;

use super::{Channel, ChannelError};

/// Last non-null write wins; null writes leave the value alone. An optional default is
/// the value before the first write (e.g. `next` defaults to END, `instruction` to "").
#[derive(Debug, Clone, Default)]
pub struct ReplaceIfPresent {
    default: Option<Value>,
}

impl ReplaceIfPresent {
    pub fn new() -> Self {
        Self { default: None }
    }

    pub fn with_default(default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
        }
    }
}

impl Channel for ReplaceIfPresent {
    fn channel_type(&self) -> &'static str {
        "ReplaceIfPresent"
    }

    fn initial(&self) -> Option<Value> {
        self.default.clone()
    }

    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError> {
        match writes.into_iter().filter(|w| !w.is_null()).last() {
            Some(last) => {
                *value = Some(last);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: null writes are skipped; the last present value wins.
    #[test]
    fn skips_null_writes() {
        let ch = ReplaceIfPresent::new();
        let mut v = Some(json!(["a"]));
        assert!(!ch.update(&mut v, vec![Value::Null]).unwrap());
        assert_eq!(v, Some(json!(["a"])));
        assert!(ch.update(&mut v, vec![json!(["b"]), Value::Null]).unwrap());
        assert_eq!(v, Some(json!(["b"])));
    }

    /// **Scenario**: an empty list is a present value and clears the channel.
    #[test]
    fn empty_list_replaces() {
        let ch = ReplaceIfPresent::new();
        let mut v = Some(json!([1, 2]));
        ch.update(&mut v, vec![json!([])]).unwrap();
        assert_eq!(v, Some(json!([])));
    }

    #[test]
    fn default_is_initial_value() {
        assert_eq!(ReplaceIfPresent::with_default("__end__").initial(), Some(json!("__end__")));
        assert_eq!(ReplaceIfPresent::new().initial(), None);
    }
}
