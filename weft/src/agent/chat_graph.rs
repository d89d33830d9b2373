//! Full conversation graph: optional retrieval, then planning or a direct answer.
//!
//! ```text
//! START ─┬─ generate_query → retrieve → grade_documents ─┬─ planner → … → END
//!        ├─ planner → execute_step → replan → … → END     └─ answer
//!        └─ answer  (agent → END | supervisor sub-graph)
//! ```
//!
//! In supervised mode each plan step runs through its own supervisor sub-graph, so steps
//! reach the same capability workers as direct answers.
//!
//! Routing out of `START` and `grade_documents` reads the `flags` channel, so a resumed
//! run takes the same branches as the run that suspended.

use std::sync::Arc;

use crate::graph::{
    path_map, CompilationError, CompiledStateGraph, GraphState, StateGraph,
    DEFAULT_RECURSION_LIMIT, END, START,
};
use crate::llm::LlmClient;
use crate::memory::Checkpointer;
use crate::prompts;
use crate::retrieval::{add_retrieval_nodes, Retriever, GENERATE_QUERY, GRADE_DOCUMENTS};
use crate::state::{add_chat_channels, ChatFlags, FLAGS};
use crate::tool_source::{ToolSource, Toolkit};

use super::filesystem::filesystem_worker;
use super::planning::{add_planning_nodes, PLANNER};
use super::react::{ReactWorker, DEFAULT_MAX_ITERATIONS};
use super::supervisor::{
    add_supervisor_nodes, SupervisedWorkers, SupervisorWorker, WorkerNode, BROWSER_WORKER, FS_WORKER,
    SHELL_WORKER, SUPERVISOR, VECTORSTORE_WORKER,
};
use super::vectorstore::VectorstoreWorker;
use super::worker::Worker;

/// Node id of the single-agent answer.
pub const AGENT: &str = "agent";
/// Name of the worker that executes plan steps.
pub const PLAN_WORKER: &str = "plan_worker";

/// How the conversation is answered when no plan is made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentMode {
    /// One ReAct worker over every loaded tool.
    #[default]
    Single,
    /// Supervisor routing between capability-scoped workers and the user.
    Supervised,
}

impl AgentMode {
    /// Node the graph enters to answer.
    pub fn answer_node(self) -> &'static str {
        match self {
            AgentMode::Single => AGENT,
            AgentMode::Supervised => SUPERVISOR,
        }
    }
}

/// Dependencies shared by every node of a chat graph, built once at startup.
#[derive(Clone)]
pub struct ChatDeps {
    pub llm: Arc<dyn LlmClient>,
    pub retriever: Arc<Retriever>,
    pub toolkit: Toolkit,
    pub max_worker_iterations: usize,
    pub recursion_limit: usize,
}

impl ChatDeps {
    pub fn new(llm: Arc<dyn LlmClient>, retriever: Arc<Retriever>, toolkit: Toolkit) -> Self {
        Self {
            llm,
            retriever,
            toolkit,
            max_worker_iterations: DEFAULT_MAX_ITERATIONS,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    fn react(&self, name: &str, tools: Arc<dyn ToolSource>, prompt: &str) -> ReactWorker {
        ReactWorker::new(name, self.llm.clone(), tools, prompt)
            .with_max_iterations(self.max_worker_iterations)
    }

    /// ReAct worker over every tool; answers single-agent turns and unsupervised plan steps.
    fn general_worker(&self, name: &str) -> Arc<dyn Worker> {
        Arc::new(self.react(name, Arc::new(self.toolkit.all.clone()), prompts::ASSISTANT_SYSTEM))
    }

    fn supervised_workers(&self) -> SupervisedWorkers {
        SupervisedWorkers {
            filesystem: Arc::new(
                filesystem_worker(FS_WORKER, self.llm.clone(), Arc::new(self.toolkit.filesystem.clone()))
                    .with_max_iterations(self.max_worker_iterations),
            ),
            shell: Arc::new(self.react(
                SHELL_WORKER,
                Arc::new(self.toolkit.shell.clone()),
                prompts::SHELL_WORKER_SYSTEM,
            )),
            browser: Arc::new(self.react(
                BROWSER_WORKER,
                Arc::new(self.toolkit.browser.clone()),
                prompts::BROWSER_WORKER_SYSTEM,
            )),
            vectorstore: Arc::new(VectorstoreWorker::new(
                VECTORSTORE_WORKER,
                self.llm.clone(),
                self.retriever.clone(),
            )),
        }
    }
}

fn flags(state: &GraphState) -> ChatFlags {
    state.get_or_default(FLAGS).unwrap_or_default()
}

/// Entry routing: retrieval first when a source is enabled, then plan or answer.
pub fn route_entry(state: &GraphState, answer_node: &str) -> String {
    let flags = flags(state);
    if flags.retrieval_enabled() {
        GENERATE_QUERY.to_string()
    } else {
        route_after_retrieval(state, answer_node)
    }
}

/// After grading: planner in smart mode, else the answering node.
pub fn route_after_retrieval(state: &GraphState, answer_node: &str) -> String {
    if flags(state).planner_mode {
        PLANNER.to_string()
    } else {
        answer_node.to_string()
    }
}

/// Wires and compiles the chat graph for `mode`.
pub fn build_chat_graph(
    deps: &ChatDeps,
    mode: AgentMode,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> Result<CompiledStateGraph, CompilationError> {
    let answer = mode.answer_node();
    let mut graph = StateGraph::new();
    add_chat_channels(&mut graph).with_recursion_limit(deps.recursion_limit);

    add_retrieval_nodes(&mut graph, deps.llm.clone(), deps.retriever.clone());
    let plan_worker: Arc<dyn Worker> = match mode {
        AgentMode::Single => deps.general_worker(PLAN_WORKER),
        AgentMode::Supervised => Arc::new(SupervisorWorker::new(
            PLAN_WORKER,
            deps.llm.clone(),
            deps.supervised_workers(),
            deps.recursion_limit,
        )?),
    };
    add_planning_nodes(&mut graph, deps.llm.clone(), plan_worker);
    match mode {
        AgentMode::Single => {
            graph
                .add_node(AGENT, Arc::new(WorkerNode::new(AGENT, deps.general_worker(AGENT))))
                .add_edge(AGENT, END);
        }
        AgentMode::Supervised => {
            add_supervisor_nodes(&mut graph, deps.llm.clone(), deps.supervised_workers());
        }
    }

    graph
        .add_conditional_edges(
            START,
            Arc::new(move |s: &GraphState| route_entry(s, answer)),
            Some(path_map([
                (GENERATE_QUERY, GENERATE_QUERY),
                (PLANNER, PLANNER),
                (answer, answer),
            ])),
        )
        .add_conditional_edges(
            GRADE_DOCUMENTS,
            Arc::new(move |s: &GraphState| route_after_retrieval(s, answer)),
            Some(path_map([(PLANNER, PLANNER), (answer, answer)])),
        );

    tracing::debug!(?mode, "chat graph wired");
    match checkpointer {
        Some(c) => graph.compile_with_checkpointer(c),
        None => graph.compile(),
    }
}
