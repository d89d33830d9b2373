//! Node-level and run-level errors.
//!
//! `AgentError` is what a node returns; the engine wraps it into `GraphError::Node`
//! together with the node id. Configuration and persistence failures surface directly
//! as `GraphError` variants.

use thiserror::Error;

use crate::channels::ChannelError;
use crate::graph::CompilationError;
use crate::llm::LlmError;
use crate::memory::CheckpointError;
use crate::retrieval::RetrievalError;
use crate::tool_source::ToolSourceError;

/// Error returned by a node or a worker agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Tool(#[from] ToolSourceError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// The model returned data that does not match the requested schema.
    #[error("structured output: {0}")]
    StructuredOutput(String),
    /// Reading or writing a state channel failed (bad shape in state).
    #[error("state: {0}")]
    State(String),
}

/// Error that ends a graph run.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {node} failed: {source}")]
    Node {
        node: String,
        #[source]
        source: AgentError,
    },
    /// A conditional edge returned a key with no target.
    #[error("conditional edge from {node} returned unmapped route: {route}")]
    UnmappedRoute { node: String, route: String },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error("recursion limit of {0} supersteps reached")]
    RecursionLimit(usize),
    /// `resume` was called on a thread without an interrupted task.
    #[error("nothing to resume for thread {0}")]
    NothingToResume(String),
    /// Suspend/resume and state inspection need a checkpointer and a thread id.
    #[error("checkpointer and thread_id required: {0}")]
    CheckpointerRequired(&'static str),
}
