//! Bridge from engine [`StreamEvent`]s to the wire [`ProtocolEvent`].

use stream_event::{EnvelopeState, ProtocolEvent};
use serde_json::Value;

use crate::stream::StreamEvent;

/// Maps one engine event onto its wire shape.
pub fn to_protocol_event(event: StreamEvent) -> ProtocolEvent {
    match event {
        StreamEvent::TaskStart { node, step, .. } => ProtocolEvent::NodeEnter { id: node, step },
        StreamEvent::Updates { node, update, .. } => ProtocolEvent::Updates {
            id: node,
            state: update,
        },
        StreamEvent::Values { state, .. } => ProtocolEvent::Values { state },
        StreamEvent::Checkpoint { config, step } => ProtocolEvent::Checkpoint {
            checkpoint_id: config.checkpoint_id.unwrap_or_default(),
            step,
            thread_id: config.thread_id,
            checkpoint_ns: (!config.checkpoint_ns.is_empty()).then_some(config.checkpoint_ns),
        },
        StreamEvent::Interrupt(interrupt) => ProtocolEvent::Interrupt {
            id: interrupt.node,
            value: interrupt.value,
        },
        StreamEvent::Error { node, message } => ProtocolEvent::Error { id: node, message },
    }
}

/// Converts and serializes an engine event with its envelope.
pub fn to_wire_json(event: StreamEvent, envelope: &mut EnvelopeState) -> Result<Value, serde_json::Error> {
    stream_event::to_json(&to_protocol_event(event), envelope)
}
