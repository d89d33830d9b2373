//! Graph node trait: one computation in a StateGraph.
//!
//! Receives the full state and its task context, returns a partial update or a
//! suspension request. Routing is declared on the graph (edges), not returned by nodes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

use super::{GraphState, RunContext, StateUpdate};

/// Result of running a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    /// Writes to merge into state via the channel reducers.
    Continue(StateUpdate),
    /// Halt the run and surface `payload` to the caller. The node runs again on resume
    /// with the resume value in `RunContext::resume`.
    Suspend(Value),
}

impl From<StateUpdate> for NodeOutput {
    fn from(u: StateUpdate) -> Self {
        Self::Continue(u)
    }
}

/// One node of a graph.
///
/// **Interaction**: registered with `StateGraph::add_node`; the engine runs every node
/// scheduled in a superstep concurrently and merges their updates in registration order.
#[async_trait]
pub trait Node: Send + Sync {
    /// Node id (e.g. `"retrieve"`, `"supervisor"`). Must be unique within a graph.
    fn id(&self) -> &str;

    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<NodeOutput, AgentError>;
}

type BoxedNodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutput, AgentError>> + Send>>;

/// Node built from an async closure over owned state and context.
pub struct FnNode {
    id: String,
    f: Arc<dyn Fn(GraphState, RunContext) -> BoxedNodeFuture + Send + Sync>,
}

impl FnNode {
    pub fn new<F, Fut>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(GraphState, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput, AgentError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            f: Arc::new(move |s, c| Box::pin(f(s, c))),
        }
    }

    /// Shorthand returning `Arc<dyn Node>` for `add_node`.
    pub fn arc<F, Fut>(id: impl Into<String>, f: F) -> Arc<dyn Node>
    where
        F: Fn(GraphState, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput, AgentError>> + Send + 'static,
    {
        Arc::new(Self::new(id, f))
    }
}

#[async_trait]
impl Node for FnNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        (self.f)(state.clone(), ctx.clone()).await
    }
}
