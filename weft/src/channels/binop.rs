//! BinaryOperatorAggregate: folds writes with a custom operator.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{Channel, ChannelError};

type Operator = Arc<dyn Fn(Value, Value) -> Result<Value, String> + Send + Sync>;

/// Applies `op(accumulator, write)` for each write, starting from `initial`.
#[derive(Clone)]
pub struct BinaryOperatorAggregate {
    name: String,
    initial: Value,
    op: Operator,
}

impl BinaryOperatorAggregate {
    /// `name` is only used in error messages.
    pub fn new<F>(name: impl Into<String>, initial: Value, op: F) -> Self
    where
        F: Fn(Value, Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            initial,
            op: Arc::new(op),
        }
    }

    /// Numeric sum; non-numeric writes are rejected.
    pub fn sum(name: impl Into<String>) -> Self {
        Self::new(name, Value::from(0), |a, b| match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) if a.is_i64() && b.is_i64() => {
                Ok(Value::from(x as i64 + y as i64))
            }
            (Some(x), Some(y)) => Ok(Value::from(x + y)),
            _ => Err(format!("cannot add {} and {}", a, b)),
        })
    }
}

impl fmt::Debug for BinaryOperatorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOperatorAggregate")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("op", &"<function>")
            .finish()
    }
}

impl Channel for BinaryOperatorAggregate {
    fn channel_type(&self) -> &'static str {
        "BinaryOperatorAggregate"
    }

    fn initial(&self) -> Option<Value> {
        Some(self.initial.clone())
    }

    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError> {
        if writes.is_empty() {
            return Ok(false);
        }
        let mut acc = value.take().unwrap_or_else(|| self.initial.clone());
        for w in writes {
            acc = (self.op)(acc, w).map_err(|reason| ChannelError::InvalidUpdate {
                channel: self.name.clone(),
                reason,
            })?;
        }
        *value = Some(acc);
        Ok(true)
    }
}
