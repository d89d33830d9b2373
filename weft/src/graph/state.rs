//! Graph state (channel name -> value) and the partial updates nodes return.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// Accumulated channel values of one run.
///
/// Nodes read it through typed accessors; only the engine mutates it, by applying
/// reducers to [`StateUpdate`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphState {
    values: BTreeMap<String, Value>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.values.get(channel)
    }

    /// Deserializes a channel; `Ok(None)` when the channel has no value or holds null.
    pub fn get_as<T: DeserializeOwned>(&self, channel: &str) -> Result<Option<T>, AgentError> {
        match self.values.get(channel) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| AgentError::State(format!("channel {}: {}", channel, e))),
        }
    }

    /// Like [`GraphState::get_as`] but falls back to `T::default()`.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, channel: &str) -> Result<T, AgentError> {
        Ok(self.get_as(channel)?.unwrap_or_default())
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.values
    }

    /// User-facing view without the engine's trigger channels.
    pub fn public(&self) -> GraphState {
        Self {
            values: self
                .values
                .iter()
                .filter(|(k, _)| !k.starts_with(crate::channels::TRIGGER_PREFIX))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.public().values.into_iter().collect())
    }
}

/// Partial channel writes returned by one node, in write order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    writes: Vec<(String, Value)>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw JSON write.
    pub fn set(mut self, channel: impl Into<String>, value: Value) -> Self {
        self.writes.push((channel.into(), value));
        self
    }

    /// Serializes `value` and adds it as a write.
    pub fn write<T: Serialize + ?Sized>(
        self,
        channel: impl Into<String>,
        value: &T,
    ) -> Result<Self, AgentError> {
        let channel = channel.into();
        let v = serde_json::to_value(value)
            .map_err(|e| AgentError::State(format!("channel {}: {}", channel, e)))?;
        Ok(self.set(channel, v))
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[(String, Value)] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<(String, Value)> {
        self.writes
    }

    /// Object view for stream events; later writes to the same channel win.
    pub fn to_value(&self) -> Value {
        Value::Object(self.writes.iter().cloned().collect())
    }

    /// Builds an update from a JSON object (used for graph input).
    pub fn from_object(value: Value) -> Result<Self, AgentError> {
        match value {
            Value::Object(map) => Ok(Self {
                writes: map.into_iter().collect(),
            }),
            Value::Null => Ok(Self::default()),
            other => Err(AgentError::State(format!(
                "input must be a JSON object, got {}",
                other
            ))),
        }
    }
}

impl From<Vec<(String, Value)>> for StateUpdate {
    fn from(writes: Vec<(String, Value)>) -> Self {
        Self { writes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: get_as deserializes present values and treats null as absent.
    #[test]
    fn get_as_handles_null_and_missing() {
        let mut s = GraphState::new();
        s.values_mut().insert("n".into(), json!(3));
        s.values_mut().insert("z".into(), Value::Null);
        assert_eq!(s.get_as::<i64>("n").unwrap(), Some(3));
        assert_eq!(s.get_as::<i64>("z").unwrap(), None);
        assert_eq!(s.get_or_default::<Vec<String>>("missing").unwrap(), Vec::<String>::new());
        assert!(s.get_as::<String>("n").is_err());
    }

    /// **Scenario**: public() hides trigger channels.
    #[test]
    fn public_hides_triggers() {
        let mut s = GraphState::new();
        s.values_mut().insert("branch:to:agent".into(), json!(true));
        s.values_mut().insert("messages".into(), json!([]));
        assert_eq!(s.to_value(), json!({"messages": []}));
    }

    /// **Scenario**: updates keep write order and serialize typed values.
    #[test]
    fn update_builder_keeps_order() {
        let u = StateUpdate::new()
            .set("b", json!(1))
            .write("a", &vec!["x"])
            .unwrap();
        let names: Vec<_> = u.writes().iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(u.to_value(), json!({"a": ["x"], "b": 1}));
    }

    #[test]
    fn from_object_rejects_non_objects() {
        assert!(StateUpdate::from_object(json!([1])).is_err());
        assert!(StateUpdate::from_object(Value::Null).unwrap().is_empty());
    }
}
