//! Wire shape of weft stream events: `type` + payload, plus a per-run envelope.
//!
//! This crate does not depend on weft. `weft::protocol` converts engine events into
//! [`ProtocolEvent`] and serializes them with [`to_json`].

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
