//! State graph: channels, nodes, edges; compile, then invoke, stream or resume.
//!
//! Execution follows a superstep model: all nodes scheduled in a step run concurrently,
//! their updates merge through channel reducers in registration order, and the step is
//! committed as one checkpoint. A node suspends the run by returning
//! [`NodeOutput::Suspend`]; `CompiledStateGraph::resume` re-runs it with the resume value.

mod compile_error;
mod compiled;
mod conditional;
mod interrupt;
mod logging;
mod node;
mod pregel;
mod run_context;
mod state;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, RunOutcome, StateSnapshot};
pub use conditional::{path_map, ConditionalRouter, ConditionalRouterFn};
pub use interrupt::Interrupt;
pub use logging::{log_graph_error, log_run_complete, log_run_start};
pub use node::{FnNode, Node, NodeOutput};
pub use run_context::RunContext;
pub use state::{GraphState, StateUpdate};
pub use state_graph::{StateGraph, DEFAULT_RECURSION_LIMIT, END, START};
