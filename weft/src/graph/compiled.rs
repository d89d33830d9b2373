//! Compiled state graph: immutable wiring plus an optional checkpointer.
//!
//! Built by `StateGraph::compile` or `compile_with_checkpointer`. `invoke` drives the
//! superstep loop to completion or suspension; `stream` runs the same loop on a spawned
//! task and hands back a stream of events; `resume` continues a suspended thread.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{trigger_channel, Channel};
use crate::error::GraphError;
use crate::memory::{
    parse_version, ChannelVersions, CheckpointMetadata, CheckpointTuple, Checkpointer,
    ListOptions, RunnableConfig, INTERRUPT,
};
use crate::stream::{Emitter, StreamEvent, StreamMode, STREAM_BUFFER};

use super::conditional::ConditionalRouter;
use super::interrupt::Interrupt;
use super::node::Node;
use super::pregel::{self, RunInput};
use super::state::GraphState;

/// Validated graph wiring shared by all runs.
pub(crate) struct GraphInner {
    /// Declared channels plus one trigger channel per node.
    pub(crate) channels: BTreeMap<String, Arc<dyn Channel>>,
    /// Registration order.
    pub(crate) nodes: Vec<(String, Arc<dyn Node>)>,
    pub(crate) edges: Vec<(String, String)>,
    pub(crate) conditional_edges: Vec<(String, ConditionalRouter)>,
    pub(crate) recursion_limit: usize,
}

impl GraphInner {
    pub(crate) fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|(n, _)| n == id)
    }

    /// Nodes whose trigger advanced past the version they last saw, in registration order.
    pub(crate) fn ready_nodes(
        &self,
        versions: &ChannelVersions,
        versions_seen: &BTreeMap<String, ChannelVersions>,
    ) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(id, _)| {
                let trigger = trigger_channel(id);
                let current = versions.get(&trigger).map(|v| parse_version(v)).unwrap_or(0);
                let seen = versions_seen
                    .get(id)
                    .and_then(|m| m.get(&trigger))
                    .map(|v| parse_version(v))
                    .unwrap_or(0);
                current > seen
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stored values completed with channel defaults for anything missing.
    pub(crate) fn state_from_values(&self, mut values: BTreeMap<String, Value>) -> GraphState {
        for (name, channel) in &self.channels {
            if !values.contains_key(name) {
                if let Some(initial) = channel.initial() {
                    values.insert(name.clone(), initial);
                }
            }
        }
        GraphState::from_values(values)
    }

    fn snapshot(&self, tuple: CheckpointTuple) -> StateSnapshot {
        let next = self.ready_nodes(
            &tuple.checkpoint.channel_versions,
            &tuple.checkpoint.versions_seen,
        );
        let interrupts = tuple
            .pending_writes
            .iter()
            .filter(|w| w.channel == INTERRUPT)
            .filter_map(|w| serde_json::from_value(w.value.clone()).ok())
            .collect();
        StateSnapshot {
            values: self.state_from_values(tuple.checkpoint.channel_values).public(),
            next,
            config: tuple.config,
            parent_config: tuple.parent_config,
            metadata: tuple.metadata,
            interrupts,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No node is scheduled anymore.
    Complete(GraphState),
    /// A node suspended. `state` is the last committed state; resume with `resume`.
    Suspended {
        interrupt: Interrupt,
        state: GraphState,
    },
    /// The stream consumer went away; the last committed checkpoint is intact.
    Cancelled(GraphState),
}

impl RunOutcome {
    pub fn state(&self) -> &GraphState {
        match self {
            Self::Complete(s) | Self::Cancelled(s) => s,
            Self::Suspended { state, .. } => state,
        }
    }

    pub fn into_state(self) -> GraphState {
        match self {
            Self::Complete(s) | Self::Cancelled(s) => s,
            Self::Suspended { state, .. } => state,
        }
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::Suspended { interrupt, .. } => Some(interrupt),
            _ => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

/// A checkpoint as seen from the graph: values, what runs next, open interrupts.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub values: GraphState,
    /// Nodes scheduled for the next superstep.
    pub next: Vec<String>,
    pub config: RunnableConfig,
    pub parent_config: Option<RunnableConfig>,
    pub metadata: CheckpointMetadata,
    pub interrupts: Vec<Interrupt>,
}

/// Executable graph. Cheap to clone; clones share wiring and checkpointer.
///
/// **Interaction**: nodes receive `&GraphState` and a `RunContext`; the checkpointer (if
/// any) receives `put_writes` per finished task and `put` per superstep.
#[derive(Clone)]
pub struct CompiledStateGraph {
    inner: Arc<GraphInner>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl CompiledStateGraph {
    pub(crate) fn from_inner(inner: GraphInner, checkpointer: Option<Arc<dyn Checkpointer>>) -> Self {
        Self {
            inner: Arc::new(inner),
            checkpointer,
        }
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    /// Node ids in registration order.
    pub fn node_ids(&self) -> Vec<String> {
        self.inner.nodes.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Runs the graph with `input` (a JSON object of channel writes).
    ///
    /// With a checkpointer, the run continues the thread named by `config`: input is
    /// merged into the thread's latest state. A null input continues from the latest
    /// checkpoint without new writes.
    pub async fn invoke(
        &self,
        input: Value,
        config: &RunnableConfig,
    ) -> Result<RunOutcome, GraphError> {
        let mut emitter = Emitter::silent();
        pregel::run(
            &self.inner,
            self.checkpointer.as_deref(),
            config,
            RunInput::Input(input),
            &mut emitter,
        )
        .await
    }

    /// Resumes a suspended thread; the interrupted node receives `value` as its resume value.
    pub async fn resume(
        &self,
        value: Value,
        config: &RunnableConfig,
    ) -> Result<RunOutcome, GraphError> {
        let mut emitter = Emitter::silent();
        pregel::run(
            &self.inner,
            self.checkpointer.as_deref(),
            config,
            RunInput::Resume(value),
            &mut emitter,
        )
        .await
    }

    /// Like `invoke`, but emits events for `modes` while running on a spawned task.
    pub fn stream(
        &self,
        input: Value,
        config: RunnableConfig,
        modes: HashSet<StreamMode>,
    ) -> ReceiverStream<StreamEvent> {
        self.spawn_stream(RunInput::Input(input), config, modes)
    }

    /// Like `resume`, streamed.
    pub fn stream_resume(
        &self,
        value: Value,
        config: RunnableConfig,
        modes: HashSet<StreamMode>,
    ) -> ReceiverStream<StreamEvent> {
        self.spawn_stream(RunInput::Resume(value), config, modes)
    }

    fn spawn_stream(
        &self,
        input: RunInput,
        config: RunnableConfig,
        modes: HashSet<StreamMode>,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let graph = self.clone();
        tokio::spawn(async move {
            let mut emitter = Emitter::new(tx, modes);
            // Failures were already delivered as an Error event.
            let result = pregel::run(
                &graph.inner,
                graph.checkpointer.as_deref(),
                &config,
                input,
                &mut emitter,
            )
            .await;
            if emitter.is_closed() {
                match result {
                    Ok(outcome) => tracing::debug!(
                        cancelled = matches!(outcome, RunOutcome::Cancelled(_)),
                        "stream consumer gone; run ended undelivered"
                    ),
                    Err(error) => {
                        tracing::debug!(%error, "stream consumer gone; run ended undelivered")
                    }
                }
            }
        });
        ReceiverStream::new(rx)
    }

    /// Snapshot of the checkpoint named by `config` (latest when no checkpoint id).
    pub async fn get_state(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<StateSnapshot>, GraphError> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or(GraphError::CheckpointerRequired("get_state"))?;
        let tuple = checkpointer.get_tuple(config).await?;
        Ok(tuple.map(|t| self.inner.snapshot(t)))
    }

    /// Snapshots of the thread, newest first.
    pub async fn get_state_history(
        &self,
        config: &RunnableConfig,
        limit: usize,
    ) -> Result<Vec<StateSnapshot>, GraphError> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or(GraphError::CheckpointerRequired("get_state_history"))?;
        let tuples: Vec<CheckpointTuple> = checkpointer
            .list(config, ListOptions::default().limit(limit))
            .await?
            .try_collect()
            .await?;
        Ok(tuples.into_iter().map(|t| self.inner.snapshot(t)).collect())
    }
}

impl std::fmt::Debug for CompiledStateGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStateGraph")
            .field("nodes", &self.node_ids())
            .field("channels", &self.inner.channels.keys().collect::<Vec<_>>())
            .field("checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::version_token;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Shared buffer the test subscriber writes into.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// **Scenario**: dropping the stream right away still logs how the background run
    /// ended.
    #[tokio::test]
    async fn dropped_stream_logs_run_end() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut g = crate::graph::StateGraph::new();
        g.add_channel("log", Arc::new(crate::channels::Append::new()))
            .add_node(
                "a",
                crate::graph::FnNode::arc("a", |_, _| async {
                    Ok(crate::graph::StateUpdate::new()
                        .set("log", serde_json::json!(["a"]))
                        .into())
                }),
            )
            .add_edge(crate::graph::START, "a")
            .add_edge("a", crate::graph::END);
        let graph = g.compile().unwrap();
        drop(graph.stream(serde_json::json!({}), RunnableConfig::default(), StreamMode::all()));

        for _ in 0..50 {
            if logs.text().contains("run ended undelivered") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(logs.text().contains("stream consumer gone; run ended undelivered"));
    }

    /// **Scenario**: a node is ready only when its trigger version exceeds what it saw.
    #[test]
    fn ready_nodes_compare_trigger_versions() {
        let inner = GraphInner {
            channels: BTreeMap::new(),
            nodes: vec![],
            edges: vec![],
            conditional_edges: vec![],
            recursion_limit: 25,
        };
        assert!(inner.ready_nodes(&ChannelVersions::new(), &BTreeMap::new()).is_empty());

        let mut versions = ChannelVersions::new();
        versions.insert(trigger_channel("a"), version_token(2));
        let mut seen = BTreeMap::new();
        seen.insert(
            "a".to_string(),
            [(trigger_channel("a"), version_token(2))].into_iter().collect(),
        );
        let a: Arc<dyn Node> = crate::graph::FnNode::arc("a", |_, _| async {
            Ok(crate::graph::NodeOutput::Continue(Default::default()))
        });
        let inner = GraphInner {
            nodes: vec![("a".into(), a)],
            ..inner
        };
        assert!(inner.ready_nodes(&versions, &seen).is_empty());
        versions.insert(trigger_channel("a"), version_token(3));
        assert_eq!(inner.ready_nodes(&versions, &seen), vec!["a".to_string()]);
    }
}
