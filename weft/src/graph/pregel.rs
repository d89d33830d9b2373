//! Superstep loop.
//!
//! One superstep: pick the ready nodes, run them concurrently, record each task's writes
//! as it finishes, then (if nothing failed or suspended) merge all writes through the
//! channel reducers in registration order, evaluate edges on the merged state and commit
//! a checkpoint.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Map, Value};

use crate::channels::{trigger_channel, ChannelError};
use crate::error::{AgentError, GraphError};
use crate::memory::{
    parse_version, version_token, writes_idx_map, ChannelVersions, Checkpoint, CheckpointError,
    CheckpointMetadata, CheckpointSource, Checkpointer, PendingWrite, RunnableConfig, ERROR,
    INTERRUPT, RESUME,
};
use crate::stream::{Emitter, StreamEvent};

use super::compiled::{GraphInner, RunOutcome};
use super::interrupt::Interrupt;
use super::logging::{
    log_checkpoint, log_graph_error, log_interrupt, log_node_complete, log_node_reused,
    log_node_start, log_run_complete, log_run_start, log_superstep,
};
use super::node::NodeOutput;
use super::run_context::RunContext;
use super::state::{GraphState, StateUpdate};
use super::state_graph::{END, START};

/// Marker write for a task that finished without writes, so a resumed superstep can tell
/// it apart from a task that never ran.
pub(crate) const NO_WRITES: &str = "__no_writes__";

pub(crate) enum RunInput {
    Input(Value),
    Resume(Value),
}

/// Runs the graph and reports a failure as a terminal `Error` event.
pub(crate) async fn run(
    graph: &GraphInner,
    checkpointer: Option<&dyn Checkpointer>,
    config: &RunnableConfig,
    input: RunInput,
    emitter: &mut Emitter,
) -> Result<RunOutcome, GraphError> {
    let result = run_inner(graph, checkpointer, config, input, emitter).await;
    if let Err(error) = &result {
        log_graph_error(error);
        let node = match error {
            GraphError::Node { node, .. } => Some(node.clone()),
            _ => None,
        };
        emitter
            .emit(StreamEvent::Error {
                node,
                message: error.to_string(),
            })
            .await;
    }
    result
}

async fn run_inner(
    graph: &GraphInner,
    checkpointer: Option<&dyn Checkpointer>,
    config: &RunnableConfig,
    input: RunInput,
    emitter: &mut Emitter,
) -> Result<RunOutcome, GraphError> {
    let saved = match checkpointer {
        Some(cp) => cp.get_tuple(config).await?,
        None => None,
    };

    match (input, saved) {
        (RunInput::Resume(value), saved) => {
            let Some(cp) = checkpointer else {
                return Err(GraphError::CheckpointerRequired("resume"));
            };
            let thread = config.thread_id.clone().unwrap_or_default();
            let tuple = saved.ok_or_else(|| GraphError::NothingToResume(thread.clone()))?;
            if !tuple.pending_writes.iter().any(|w| w.channel == INTERRUPT) {
                return Err(GraphError::NothingToResume(thread));
            }
            log_run_start(config.thread_id.as_deref(), true);
            let pending = tuple.pending_writes.clone();
            let mut run = PregelLoop::from_tuple(graph, Some(cp), tuple);
            run.drive(pending, Some(value), emitter).await
        }
        (RunInput::Input(Value::Null), Some(tuple)) => {
            log_run_start(config.thread_id.as_deref(), true);
            let pending = tuple.pending_writes.clone();
            let mut run = PregelLoop::from_tuple(graph, checkpointer, tuple);
            run.drive(pending, None, emitter).await
        }
        (RunInput::Input(value), saved) => {
            log_run_start(config.thread_id.as_deref(), false);
            let mut run = match saved {
                Some(tuple) => PregelLoop::from_tuple(graph, checkpointer, tuple),
                None => PregelLoop::fresh(graph, checkpointer, config),
            };
            run.apply_input(value, emitter).await?;
            run.drive(Vec::new(), None, emitter).await
        }
    }
}

enum TaskResult {
    Writes(Vec<(String, Value)>),
    Interrupted(Interrupt),
    Failed(AgentError),
}

struct Task {
    node: String,
    id: String,
}

struct PregelLoop<'g> {
    graph: &'g GraphInner,
    checkpointer: Option<&'g dyn Checkpointer>,
    /// Points at the current checkpoint once one was committed.
    config: RunnableConfig,
    state: GraphState,
    versions: ChannelVersions,
    versions_seen: BTreeMap<String, ChannelVersions>,
    /// Step of the current checkpoint.
    step: i64,
}

impl<'g> PregelLoop<'g> {
    fn fresh(
        graph: &'g GraphInner,
        checkpointer: Option<&'g dyn Checkpointer>,
        config: &RunnableConfig,
    ) -> Self {
        Self {
            graph,
            checkpointer,
            config: config.latest(),
            state: graph.state_from_values(BTreeMap::new()),
            versions: ChannelVersions::new(),
            versions_seen: BTreeMap::new(),
            // The input superstep commits step -1.
            step: -2,
        }
    }

    fn from_tuple(
        graph: &'g GraphInner,
        checkpointer: Option<&'g dyn Checkpointer>,
        tuple: crate::memory::CheckpointTuple,
    ) -> Self {
        let checkpoint = tuple.checkpoint;
        Self {
            graph,
            checkpointer,
            config: tuple.config,
            state: graph.state_from_values(checkpoint.channel_values),
            versions: checkpoint.channel_versions,
            versions_seen: checkpoint.versions_seen,
            step: tuple.metadata.step,
        }
    }

    /// Input superstep: merge the input writes, follow the edges out of START, commit.
    async fn apply_input(&mut self, input: Value, emitter: &mut Emitter) -> Result<(), GraphError> {
        let update = StateUpdate::from_object(input).map_err(|e| ChannelError::InvalidUpdate {
            channel: START.to_string(),
            reason: e.to_string(),
        })?;
        let meta = update.to_value();
        let mut changed = self.apply_writes(update.into_writes())?;
        let triggers = self.route(START)?;
        changed.extend(self.apply_writes(triggers)?);
        self.step += 1;
        let mut writes = Map::new();
        writes.insert(START.to_string(), meta);
        self.commit(CheckpointSource::Input, writes, changed, emitter)
            .await
    }

    /// Runs supersteps until nothing is scheduled, a node suspends, or a run error.
    async fn drive(
        &mut self,
        mut pending: Vec<PendingWrite>,
        mut resume: Option<Value>,
        emitter: &mut Emitter,
    ) -> Result<RunOutcome, GraphError> {
        let mut steps_run = 0usize;
        loop {
            let ready = self.graph.ready_nodes(&self.versions, &self.versions_seen);
            if ready.is_empty() {
                log_run_complete(self.config.thread_id.as_deref(), steps_run);
                return Ok(RunOutcome::Complete(self.state.public()));
            }
            if emitter.is_closed() {
                tracing::info!(step = self.step, "stream closed; stopping run");
                return Ok(RunOutcome::Cancelled(self.state.public()));
            }
            if steps_run >= self.graph.recursion_limit {
                return Err(GraphError::RecursionLimit(self.graph.recursion_limit));
            }
            steps_run += 1;
            if let Some(outcome) = self
                .superstep(ready, mem::take(&mut pending), resume.take(), emitter)
                .await?
            {
                return Ok(outcome);
            }
        }
    }

    async fn superstep(
        &mut self,
        ready: Vec<String>,
        pending: Vec<PendingWrite>,
        resume: Option<Value>,
        emitter: &mut Emitter,
    ) -> Result<Option<RunOutcome>, GraphError> {
        let step = self.step + 1;
        let checkpoint_id = self.config.checkpoint_id.clone().unwrap_or_default();
        log_superstep(step, &ready);

        let tasks: Vec<Task> = ready
            .into_iter()
            .map(|node| Task {
                id: format!("{}:{}", checkpoint_id, node),
                node,
            })
            .collect();

        let mut saved: HashMap<String, Vec<PendingWrite>> = HashMap::new();
        for w in pending {
            saved.entry(w.task_id.clone()).or_default().push(w);
        }

        let mut results: Vec<Option<TaskResult>> = (0..tasks.len()).map(|_| None).collect();
        let mut to_run = Vec::new();
        for (i, task) in tasks.iter().enumerate() {
            let prior = saved.remove(&task.id).unwrap_or_default();
            let interrupted = prior.iter().any(|w| w.channel == INTERRUPT);
            let failed = prior.iter().any(|w| w.channel == ERROR);
            if !prior.is_empty() && !interrupted && !failed {
                log_node_reused(&task.node, &task.id);
                let writes = prior
                    .into_iter()
                    .filter(|w| w.channel != NO_WRITES && writes_idx_map(&w.channel).is_none())
                    .map(|w| (w.channel, w.value))
                    .collect();
                results[i] = Some(TaskResult::Writes(writes));
                continue;
            }
            let mut ctx = RunContext::new(self.config.clone(), step, task.id.clone());
            if interrupted {
                if let Some(value) = &resume {
                    self.put_writes(&[(RESUME.to_string(), value.clone())], &task.id)
                        .await?;
                    ctx = ctx.with_resume(value.clone());
                    if let Some(payload) = prior
                        .iter()
                        .find(|w| w.channel == INTERRUPT)
                        .and_then(|w| w.value.get("value"))
                    {
                        ctx = ctx.with_interrupt(payload.clone());
                    }
                }
            }
            to_run.push((i, ctx));
        }

        for (i, _) in &to_run {
            let task = &tasks[*i];
            emitter
                .emit(StreamEvent::TaskStart {
                    node: task.node.clone(),
                    task_id: task.id.clone(),
                    step,
                })
                .await;
        }

        let mut persist_error: Option<CheckpointError> = None;
        {
            let state = &self.state;
            let mut running = FuturesUnordered::new();
            for (i, ctx) in to_run {
                let task = &tasks[i];
                let node = self
                    .graph
                    .nodes
                    .iter()
                    .find(|(id, _)| *id == task.node)
                    .map(|(_, n)| n.clone());
                running.push(async move {
                    let result = match node {
                        Some(node) => {
                            log_node_start(&task.node, &task.id);
                            node.run(state, &ctx).await
                        }
                        None => Err(AgentError::ExecutionFailed(format!(
                            "node {} is not registered",
                            task.node
                        ))),
                    };
                    (i, result)
                });
            }

            while let Some((i, result)) = running.next().await {
                let task = &tasks[i];
                let (record, outcome) = match result {
                    Ok(NodeOutput::Continue(update)) => {
                        let writes = update.into_writes();
                        log_node_complete(&task.node, writes.len());
                        emitter
                            .emit(StreamEvent::Updates {
                                node: task.node.clone(),
                                update: Value::Object(writes.iter().cloned().collect()),
                                step,
                            })
                            .await;
                        let record = if writes.is_empty() {
                            vec![(NO_WRITES.to_string(), Value::Null)]
                        } else {
                            writes.clone()
                        };
                        (record, TaskResult::Writes(writes))
                    }
                    Ok(NodeOutput::Suspend(payload)) => {
                        let interrupt = Interrupt::new(&task.node, &task.id, payload);
                        log_interrupt(&task.node, &task.id);
                        let value = serde_json::to_value(&interrupt).unwrap_or(Value::Null);
                        emitter.emit(StreamEvent::Interrupt(interrupt.clone())).await;
                        (
                            vec![(INTERRUPT.to_string(), value)],
                            TaskResult::Interrupted(interrupt),
                        )
                    }
                    Err(error) => {
                        tracing::error!(node_id = %task.node, %error, "Node execution failed");
                        (
                            vec![(ERROR.to_string(), json!({ "message": error.to_string() }))],
                            TaskResult::Failed(error),
                        )
                    }
                };
                if let Some(cp) = self.checkpointer {
                    if let Err(e) = cp.put_writes(&self.config, &record, &task.id).await {
                        persist_error.get_or_insert(e);
                    }
                }
                results[i] = Some(outcome);
            }
        }
        if let Some(e) = persist_error {
            return Err(e.into());
        }

        let mut writes_by_node = Vec::new();
        let mut interrupts = Vec::new();
        for (task, result) in tasks.iter().zip(results) {
            match result {
                Some(TaskResult::Failed(source)) => {
                    return Err(GraphError::Node {
                        node: task.node.clone(),
                        source,
                    })
                }
                Some(TaskResult::Interrupted(i)) => interrupts.push(i),
                Some(TaskResult::Writes(w)) => writes_by_node.push((task.node.clone(), w)),
                None => {}
            }
        }
        if let Some(interrupt) = interrupts.into_iter().next() {
            return Ok(Some(RunOutcome::Suspended {
                interrupt,
                state: self.state.public(),
            }));
        }

        for task in &tasks {
            let trigger = trigger_channel(&task.node);
            if let Some(v) = self.versions.get(&trigger) {
                self.versions_seen
                    .entry(task.node.clone())
                    .or_default()
                    .insert(trigger, v.clone());
            }
        }

        let mut meta = Map::new();
        let mut all_writes = Vec::new();
        for (node, writes) in writes_by_node {
            meta.insert(node, Value::Object(writes.iter().cloned().collect()));
            all_writes.extend(writes);
        }
        let mut changed = self.apply_writes(all_writes)?;
        let mut triggers = Vec::new();
        for task in &tasks {
            triggers.extend(self.route(&task.node)?);
        }
        changed.extend(self.apply_writes(triggers)?);

        self.step = step;
        self.commit(CheckpointSource::Loop, meta, changed, emitter)
            .await?;
        Ok(None)
    }

    /// Applies writes grouped per channel, preserving write order within a channel.
    /// Returns the channels whose value changed; their versions are bumped.
    fn apply_writes(&mut self, writes: Vec<(String, Value)>) -> Result<Vec<String>, GraphError> {
        let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for (channel, value) in writes {
            if channel == NO_WRITES {
                continue;
            }
            grouped.entry(channel).or_default().push(value);
        }
        let mut changed = Vec::new();
        for (name, values) in grouped {
            let channel = self
                .graph
                .channels
                .get(&name)
                .ok_or_else(|| ChannelError::UnknownChannel(name.clone()))?;
            let mut slot = self.state.values_mut().remove(&name);
            let did_change = channel.update(&mut slot, values)?;
            if let Some(v) = slot {
                self.state.values_mut().insert(name.clone(), v);
            }
            if did_change {
                let next = self.versions.get(&name).map(|v| parse_version(v)).unwrap_or(0) + 1;
                self.versions.insert(name.clone(), version_token(next));
                changed.push(name);
            }
        }
        Ok(changed)
    }

    /// Trigger writes for the edges leaving `source`, evaluated on the current state.
    fn route(&self, source: &str) -> Result<Vec<(String, Value)>, GraphError> {
        let mut targets = Vec::new();
        for (from, to) in &self.graph.edges {
            if from == source && to != END {
                targets.push(to.clone());
            }
        }
        for (from, router) in &self.graph.conditional_edges {
            if from != source {
                continue;
            }
            let (key, target) = router.resolve(&self.state);
            match target {
                Some(t) if t == END => {}
                Some(t) if self.graph.has_node(&t) => targets.push(t),
                _ => {
                    return Err(GraphError::UnmappedRoute {
                        node: source.to_string(),
                        route: key,
                    })
                }
            }
        }
        Ok(targets
            .into_iter()
            .map(|t| (trigger_channel(&t), Value::Bool(true)))
            .collect())
    }

    async fn put_writes(&self, writes: &[(String, Value)], task_id: &str) -> Result<(), GraphError> {
        if let Some(cp) = self.checkpointer {
            cp.put_writes(&self.config, writes, task_id).await?;
        }
        Ok(())
    }

    /// Stores the current state as a new checkpoint whose parent is the current one.
    async fn commit(
        &mut self,
        source: CheckpointSource,
        writes: Map<String, Value>,
        changed: Vec<String>,
        emitter: &mut Emitter,
    ) -> Result<(), GraphError> {
        let mut checkpoint = Checkpoint::new();
        checkpoint.channel_values = self.state.values().clone();
        checkpoint.channel_versions = self.versions.clone();
        checkpoint.versions_seen = self.versions_seen.clone();
        let metadata =
            CheckpointMetadata::new(source, self.step).with_extra("writes", Value::Object(writes));

        let changed: BTreeSet<String> = changed.into_iter().collect();
        match self.checkpointer {
            Some(cp) => {
                let new_versions: ChannelVersions = changed
                    .iter()
                    .filter_map(|c| self.versions.get(c).map(|v| (c.clone(), v.clone())))
                    .collect();
                self.config = cp
                    .put(&self.config, &checkpoint, &metadata, &new_versions)
                    .await?;
                emitter
                    .emit(StreamEvent::Checkpoint {
                        config: self.config.clone(),
                        step: self.step,
                    })
                    .await;
            }
            None => self.config.checkpoint_id = Some(checkpoint.id.clone()),
        }
        log_checkpoint(&checkpoint.id, self.step);
        emitter
            .emit(StreamEvent::Values {
                state: self.state.to_value(),
                step: self.step,
            })
            .await;
        Ok(())
    }
}
