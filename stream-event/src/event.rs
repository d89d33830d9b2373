//! Protocol-level event types. Payloads that carry graph state use `serde_json::Value`.

use serde::Serialize;
use serde_json::Value;

/// One stream event on the wire. The envelope (`session_id`, `node_id`, `event_id`)
/// is injected separately by [`crate::EnvelopeState`].
///
/// `id` in a payload is the graph node name (e.g. `"retrieve"`, `"supervisor"`);
/// `node_id` in the envelope is the span id of one node run.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    NodeEnter {
        id: String,
        step: i64,
    },
    Updates {
        id: String,
        state: Value,
    },
    Values {
        state: Value,
    },
    Checkpoint {
        checkpoint_id: String,
        step: i64,
        thread_id: Option<String>,
        checkpoint_ns: Option<String>,
    },
    /// The run is suspended waiting for a resume value.
    Interrupt {
        id: String,
        value: Value,
    },
    /// Terminal failure; no more events follow.
    Error {
        id: Option<String>,
        message: String,
    },
}

impl ProtocolEvent {
    /// Type + payload only; use [`crate::to_json`] to add the envelope.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Node this event belongs to, when it has one.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeEnter { id, .. } | Self::Updates { id, .. } | Self::Interrupt { id, .. } => {
                Some(id)
            }
            Self::Error { id, .. } => id.as_deref(),
            Self::Values { .. } | Self::Checkpoint { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProtocolEvent;
    use serde_json::json;

    #[test]
    fn updates_carries_node_name_in_id() {
        let event = ProtocolEvent::Updates {
            id: "grade_documents".to_string(),
            state: json!({"documents": []}),
        };
        let value = event.to_value().unwrap();
        assert_eq!(value["type"], "updates");
        assert_eq!(value["id"], "grade_documents");
        assert!(value.get("node_id").is_none());
    }

    #[test]
    fn interrupt_serializes_payload() {
        let event = ProtocolEvent::Interrupt {
            id: "ask_user".to_string(),
            value: json!("Which folder?"),
        };
        let value = event.to_value().unwrap();
        assert_eq!(value["type"], "interrupt");
        assert_eq!(value["value"], "Which folder?");
        assert_eq!(event.node(), Some("ask_user"));
    }

    #[test]
    fn error_without_node() {
        let event = ProtocolEvent::Error {
            id: None,
            message: "recursion limit".into(),
        };
        assert_eq!(event.to_value().unwrap()["type"], "error");
        assert_eq!(event.node(), None);
    }
}
