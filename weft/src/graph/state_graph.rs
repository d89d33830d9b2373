//! State graph: channels, nodes, explicit edges (from → to) and conditional edges.
//!
//! Declare channels with `add_channel`, add nodes with `add_node`, wire them with
//! `add_edge(from, to)` using `START` and `END` for entry and exit, and route on state
//! with `add_conditional_edges`. Then `compile` or `compile_with_checkpointer` to get a
//! `CompiledStateGraph`.
//!
//! # Execution model
//!
//! Every node owns a trigger channel. An edge into a node writes its trigger; a node
//! whose trigger changed since it last ran is scheduled in the next superstep. All nodes
//! of a superstep run concurrently, their updates are merged through the channel
//! reducers in registration order, and one checkpoint is committed.
//!
//! A node may have both plain edges and conditional edges; each fires after the node
//! runs (fan-out).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::channels::{trigger_channel, Channel, Trigger};
use crate::memory::Checkpointer;

use super::compile_error::CompilationError;
use super::compiled::{CompiledStateGraph, GraphInner};
use super::conditional::{ConditionalRouter, ConditionalRouterFn};
use super::node::Node;

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to_id` in `add_edge(last_node_id, END)`.
pub const END: &str = "__end__";

/// Default maximum number of supersteps per run.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Graph builder.
///
/// **Interaction**: accepts `Arc<dyn Node>` and `Arc<dyn Channel>`; produces
/// `CompiledStateGraph`. Validation errors are collected and reported by `compile`.
pub struct StateGraph {
    channels: BTreeMap<String, Arc<dyn Channel>>,
    nodes: Vec<(String, Arc<dyn Node>)>,
    edges: Vec<(String, String)>,
    conditional_edges: Vec<(String, ConditionalRouter)>,
    recursion_limit: usize,
    duplicate: Option<String>,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGraph {
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            conditional_edges: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            duplicate: None,
        }
    }

    /// Declares a state channel with its reducer. Writes to undeclared channels fail the run.
    pub fn add_channel(&mut self, name: impl Into<String>, channel: Arc<dyn Channel>) -> &mut Self {
        self.channels.insert(name.into(), channel);
        self
    }

    /// Adds a node. Registration order is the merge order of concurrent updates.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        let id = id.into();
        if self.nodes.iter().any(|(n, _)| *n == id) && self.duplicate.is_none() {
            self.duplicate = Some(id.clone());
        }
        self.nodes.push((id, node));
        self
    }

    /// Adds an edge. `from_id` may be START, `to_id` may be END.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source` (a node or START).
    ///
    /// After `source` runs and the superstep's updates are merged, `path(state)` returns a
    /// key. With `path_map`, the key must be a map key and the mapped value is the next
    /// node (or END); without it the key must itself be a node id or END.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// graph.add_conditional_edges(
    ///     "supervisor",
    ///     Arc::new(|s: &GraphState| s.get_or_default::<String>("next").unwrap_or_default()),
    ///     Some(path_map([("fs_worker", "fs_worker"), (END, END)])),
    /// );
    /// ```
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        path: ConditionalRouterFn,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional_edges
            .push((source.into(), ConditionalRouter::new(path, path_map)));
        self
    }

    /// Maximum supersteps per run before `GraphError::RecursionLimit`.
    pub fn with_recursion_limit(&mut self, limit: usize) -> &mut Self {
        self.recursion_limit = limit;
        self
    }

    /// Validates wiring and builds the executable graph without persistence.
    pub fn compile(self) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(None)
    }

    /// Validates wiring and builds a graph that checkpoints every superstep.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(Some(checkpointer))
    }

    fn compile_internal(
        mut self,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        if let Some(id) = self.duplicate.take() {
            return Err(CompilationError::DuplicateNode(id));
        }
        for (id, _) in &self.nodes {
            if id == START || id == END || id.contains(':') || id.is_empty() {
                return Err(CompilationError::ReservedNodeId(id.clone()));
            }
        }
        let known: HashSet<&str> = self.nodes.iter().map(|(id, _)| id.as_str()).collect();

        for (from, to) in &self.edges {
            if from != START && !known.contains(from.as_str()) {
                return Err(CompilationError::UnknownEdgeSource(from.clone()));
            }
            if to != END && !known.contains(to.as_str()) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        for (source, router) in &self.conditional_edges {
            if source != START && !known.contains(source.as_str()) {
                return Err(CompilationError::UnknownEdgeSource(source.clone()));
            }
            if let Some(targets) = router.targets() {
                for target in targets {
                    if target != END && !known.contains(target.as_str()) {
                        return Err(CompilationError::InvalidPathMapTarget {
                            node: source.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        let has_start = self.edges.iter().any(|(f, _)| f == START)
            || self.conditional_edges.iter().any(|(s, _)| s == START);
        if !has_start {
            return Err(CompilationError::MissingStart);
        }

        for (id, _) in &self.nodes {
            self.channels
                .insert(trigger_channel(id), Arc::new(Trigger));
        }

        Ok(CompiledStateGraph::from_inner(
            GraphInner {
                channels: self.channels,
                nodes: self.nodes,
                edges: self.edges,
                conditional_edges: self.conditional_edges,
                recursion_limit: self.recursion_limit,
            },
            checkpointer,
        ))
    }
}
