//! Errors raised by `StateGraph::compile` before any run starts.

use thiserror::Error;

/// Invalid graph wiring.
///
/// Returned by `StateGraph::compile`; a graph that compiles never fails a run for
/// static wiring reasons (unmapped conditional routes are checked at runtime).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An edge targets a node that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Nothing leaves START: neither an edge nor conditional edges.
    #[error("graph has no edge from START")]
    MissingStart,

    /// A conditional path_map value is not a node id or END.
    #[error("conditional path_map of {node} targets unknown node: {target}")]
    InvalidPathMapTarget { node: String, target: String },

    #[error("node added twice: {0}")]
    DuplicateNode(String),

    /// START, END, or an id containing ':' (used by task ids and trigger channels).
    #[error("reserved node id: {0}")]
    ReservedNodeId(String),

    /// An edge or conditional edge leaves a node that was never added.
    #[error("edge source not found: {0}")]
    UnknownEdgeSource(String),
}
