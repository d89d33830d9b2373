//! State channels: named slots of graph state, each with a reducer.
//!
//! A channel does not own its value; the engine keeps values in `GraphState` and calls
//! [`Channel::update`] once per superstep with every write made to that channel, in node
//! registration order. Reducers are pure, so replaying the same writes gives the same value.
//!
//! - `LastValue`: last write wins
//! - `ReplaceIfPresent`: last non-null write wins; null writes are ignored; optional default
//! - `Append`: concatenates lists (message history, past steps)
//! - `BinaryOperatorAggregate`: folds writes with a custom operator
//! - `Trigger`: internal `branch:to:<node>` channels used for scheduling

mod append;
mod binop;
mod error;
mod last_value;
mod replace;
mod trigger;

pub use append::Append;
pub use binop::BinaryOperatorAggregate;
pub use error::ChannelError;
pub use last_value::LastValue;
pub use replace::ReplaceIfPresent;
pub use trigger::{trigger_channel, Trigger, TRIGGER_PREFIX};

use std::fmt::Debug;

use serde_json::Value;

/// Reducer for one state channel.
pub trait Channel: Send + Sync + Debug {
    /// Type name for logs and introspection.
    fn channel_type(&self) -> &'static str;

    /// Value the channel holds before anything is written.
    fn initial(&self) -> Option<Value> {
        None
    }

    /// Merges one superstep's writes into `value`. Returns `true` when the value changed,
    /// which makes the engine bump the channel version.
    fn update(&self, value: &mut Option<Value>, writes: Vec<Value>) -> Result<bool, ChannelError>;
}
