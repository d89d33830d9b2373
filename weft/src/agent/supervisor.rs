//! Supervisor sub-graph: an LLM router over capability-scoped workers.
//!
//! ```text
//! supervisor ──┬─ fs_worker ─────────┐
//!              ├─ shell_worker ──────┤
//!              ├─ browser_worker ────┼──► supervisor
//!              ├─ vectorstore_worker ┤
//!              ├─ ask_user ──────────┘   (suspends; resume appends the reply)
//!              └─ END
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::graph::{
    path_map, CompilationError, CompiledStateGraph, GraphState, Node, NodeOutput, RunContext,
    StateGraph, StateUpdate, END, START,
};
use crate::llm::{structured, LlmClient, OutputSchema};
use crate::memory::RunnableConfig;
use crate::message::Message;
use crate::prompts;
use crate::state::{add_chat_channels, ChatState, DOCUMENTS, FLAGS, INSTRUCTION, LAST_NODE, MESSAGES, NEXT};

use super::worker::{Worker, WorkerOutcome, WorkerTask};

pub const SUPERVISOR: &str = "supervisor";
pub const FS_WORKER: &str = "fs_worker";
pub const SHELL_WORKER: &str = "shell_worker";
pub const BROWSER_WORKER: &str = "browser_worker";
pub const VECTORSTORE_WORKER: &str = "vectorstore_worker";
pub const ASK_USER: &str = "ask_user";

/// Worker node ids the supervisor can route to, besides `ask_user` and END.
pub const WORKERS: &[&str] = &[FS_WORKER, SHELL_WORKER, BROWSER_WORKER, VECTORSTORE_WORKER];

#[derive(Debug, Deserialize)]
struct Route {
    next: String,
    #[serde(default)]
    instruction: String,
}

fn route_schema() -> OutputSchema {
    let mut options: Vec<&str> = WORKERS.to_vec();
    options.push(ASK_USER);
    options.push(END);
    OutputSchema::new(
        "route",
        "Next worker to act and its instruction.",
        json!({
            "type": "object",
            "properties": {
                "next": {"type": "string", "enum": options},
                "instruction": {"type": "string"},
            },
            "required": ["next"],
        }),
    )
}

/// Maps the terminal aliases models tend to produce onto END.
fn normalize_next(next: &str) -> String {
    match next.trim() {
        "END" | "FINISH" | "end" | "finish" => END.to_string(),
        other => other.to_string(),
    }
}

/// Picks the next worker and writes `next` and `instruction`.
pub struct SupervisorNode {
    llm: Arc<dyn LlmClient>,
}

impl SupervisorNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for SupervisorNode {
    fn id(&self) -> &str {
        SUPERVISOR
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let mut messages = vec![Message::system(prompts::SUPERVISOR_SYSTEM)];
        messages.extend(chat.messages.iter().cloned());
        let route: Route = structured(self.llm.as_ref(), &messages, &route_schema()).await?;
        let next = normalize_next(&route.next);
        tracing::info!(%next, "supervisor routed");

        Ok(StateUpdate::new()
            .set(NEXT, json!(next))
            .set(INSTRUCTION, json!(route.instruction))
            .set(LAST_NODE, json!(SUPERVISOR))
            .into())
    }
}

/// Router for the supervisor's conditional edge: the `next` channel as written.
pub fn route_supervisor(state: &GraphState) -> String {
    ChatState::from_state(state)
        .map(|chat| chat.next)
        .unwrap_or_else(|_| END.to_string())
}

/// Runs a worker on the current instruction and appends its answer.
///
/// Also serves as the single-agent answering node, where the instruction is empty and
/// the worker answers the conversation.
pub struct WorkerNode {
    id: String,
    worker: Arc<dyn Worker>,
}

impl WorkerNode {
    pub fn new(id: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        Self {
            id: id.into(),
            worker,
        }
    }
}

#[async_trait]
impl Node for WorkerNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let task = WorkerTask::from_chat(&chat, chat.instruction.clone());
        let outcome = self.worker.run(task).await?;
        tracing::debug!(node = %self.id, worker = self.worker.name(), "worker finished");

        Ok(StateUpdate::new()
            .write(MESSAGES, &[Message::assistant(outcome.answer)])?
            .set(LAST_NODE, json!(self.id))
            .into())
    }
}

/// Suspends with the instruction as the question; on resume appends the reply.
pub struct AskUserNode;

#[async_trait]
impl Node for AskUserNode {
    fn id(&self) -> &str {
        ASK_USER
    }

    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let Some(reply) = ctx.resume_value() else {
            let chat = ChatState::from_state(state)?;
            tracing::info!(question = %chat.instruction, "asking the user");
            return Ok(NodeOutput::Suspend(Value::String(chat.instruction)));
        };
        let reply = match reply {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Ok(StateUpdate::new()
            .write(MESSAGES, &[Message::user(reply)])?
            .set(LAST_NODE, json!(ASK_USER))
            .into())
    }
}

/// The workers a supervised graph dispatches to, one per capability.
pub struct SupervisedWorkers {
    pub filesystem: Arc<dyn Worker>,
    pub shell: Arc<dyn Worker>,
    pub browser: Arc<dyn Worker>,
    pub vectorstore: Arc<dyn Worker>,
}

/// Adds the supervisor, its workers and `ask_user`, with every worker returning to the
/// supervisor. The caller wires the entry into `supervisor`.
pub fn add_supervisor_nodes(
    graph: &mut StateGraph,
    llm: Arc<dyn LlmClient>,
    workers: SupervisedWorkers,
) -> &mut StateGraph {
    let SupervisedWorkers {
        filesystem,
        shell,
        browser,
        vectorstore,
    } = workers;
    graph
        .add_node(SUPERVISOR, Arc::new(SupervisorNode::new(llm)))
        .add_node(FS_WORKER, Arc::new(WorkerNode::new(FS_WORKER, filesystem)))
        .add_node(SHELL_WORKER, Arc::new(WorkerNode::new(SHELL_WORKER, shell)))
        .add_node(BROWSER_WORKER, Arc::new(WorkerNode::new(BROWSER_WORKER, browser)))
        .add_node(
            VECTORSTORE_WORKER,
            Arc::new(WorkerNode::new(VECTORSTORE_WORKER, vectorstore)),
        )
        .add_node(ASK_USER, Arc::new(AskUserNode));
    for id in WORKERS.iter().chain(std::iter::once(&ASK_USER)) {
        graph.add_edge(*id, SUPERVISOR);
    }
    graph.add_conditional_edges(
        SUPERVISOR,
        Arc::new(route_supervisor),
        Some(path_map([
            (FS_WORKER, FS_WORKER),
            (SHELL_WORKER, SHELL_WORKER),
            (BROWSER_WORKER, BROWSER_WORKER),
            (VECTORSTORE_WORKER, VECTORSTORE_WORKER),
            (ASK_USER, ASK_USER),
            (END, END),
        ])),
    )
}

/// A worker backed by its own supervisor sub-graph, so each task can reach the
/// capability workers.
///
/// The task's instruction becomes a user message after the conversation. When the
/// sub-graph stops at `ask_user` the outcome carries the question instead of an answer.
pub struct SupervisorWorker {
    name: String,
    graph: CompiledStateGraph,
}

impl SupervisorWorker {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        workers: SupervisedWorkers,
        recursion_limit: usize,
    ) -> Result<Self, CompilationError> {
        let mut graph = StateGraph::new();
        add_chat_channels(&mut graph).with_recursion_limit(recursion_limit);
        add_supervisor_nodes(&mut graph, llm, workers).add_edge(START, SUPERVISOR);
        Ok(Self {
            name: name.into(),
            graph: graph.compile()?,
        })
    }
}

#[async_trait]
impl Worker for SupervisorWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, task: WorkerTask) -> Result<WorkerOutcome, AgentError> {
        let mut messages = task.messages;
        if !task.instruction.is_empty() {
            messages.push(Message::user(task.instruction));
        }
        let seen = messages.len();
        let input = json!({MESSAGES: messages, DOCUMENTS: task.documents, FLAGS: task.flags});

        let out = self
            .graph
            .invoke(input, &RunnableConfig::default())
            .await
            .map_err(|e| AgentError::ExecutionFailed(format!("{}: {}", self.name, e)))?;
        let chat = ChatState::from_state(out.state())?;
        let transcript: Vec<Message> = chat.messages.into_iter().skip(seen).collect();

        if let Some(interrupt) = out.interrupt() {
            let question = match &interrupt.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            tracing::debug!(worker = %self.name, %question, "supervised task asks the user");
            return Ok(WorkerOutcome {
                answer: String::new(),
                transcript,
                question: Some(question),
            });
        }
        let answer = transcript
            .iter()
            .rev()
            .find(|m| m.role() == "assistant" && !m.content().is_empty())
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        Ok(WorkerOutcome {
            answer,
            transcript,
            question: None,
        })
    }
}
