//! Envelope fields (`session_id`, `node_id`, `event_id`) and the per-run state that assigns them.

use crate::event::ProtocolEvent;
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Constant within a session (usually the thread id).
    pub session_id: Option<String>,
    /// Span id of the node run this event belongs to.
    pub node_id: Option<String>,
    /// Monotonically increasing within one stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Adds the envelope fields to a JSON object without overwriting existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.node_id {
            obj.entry("node_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id").or_insert_with(|| Value::from(id));
        }
    }
}

/// Envelope state for one run.
///
/// Node spans are keyed by node name, since nodes of one superstep run concurrently
/// and their events interleave.
pub struct EnvelopeState {
    pub session_id: String,
    spans: std::collections::HashMap<String, String>,
    span_seq: u64,
    next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            spans: Default::default(),
            span_seq: 0,
            next_event_id: 1,
        }
    }

    fn span_for(&mut self, event: &ProtocolEvent) -> String {
        let Some(node) = event.node() else {
            return "run".to_string();
        };
        if matches!(event, ProtocolEvent::NodeEnter { .. }) || !self.spans.contains_key(node) {
            let span = format!("run-{}-{}", node, self.span_seq);
            self.span_seq += 1;
            self.spans.insert(node.to_string(), span);
        }
        self.spans[node].clone()
    }

    /// Injects the envelope for `event` into `value` and advances the event counter.
    pub fn inject_into(&mut self, event: &ProtocolEvent, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_node_id(self.span_for(event))
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Type + payload + envelope for one event.
pub fn to_json(event: &ProtocolEvent, state: &mut EnvelopeState) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(event, &mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inject_keeps_existing_keys() {
        let mut obj = json!({"type": "values", "event_id": 99});
        Envelope::new()
            .with_session_id("thread-1")
            .with_event_id(1)
            .inject_into(&mut obj);
        assert_eq!(obj["session_id"], "thread-1");
        assert_eq!(obj["event_id"], 99);
    }

    #[test]
    fn events_of_one_node_share_a_span() {
        let mut state = EnvelopeState::new("thread-1");
        let enter = ProtocolEvent::NodeEnter {
            id: "retrieve".into(),
            step: 1,
        };
        let other = ProtocolEvent::NodeEnter {
            id: "generate_query".into(),
            step: 1,
        };
        let update = ProtocolEvent::Updates {
            id: "retrieve".into(),
            state: json!({}),
        };
        let a = to_json(&enter, &mut state).unwrap();
        let _ = to_json(&other, &mut state).unwrap();
        let c = to_json(&update, &mut state).unwrap();
        assert_eq!(a["node_id"], c["node_id"]);
        assert_eq!(a["event_id"], 1);
        assert_eq!(c["event_id"], 3);
    }
}
