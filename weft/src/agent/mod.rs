//! Agents on top of the graph engine: workers, planning, supervision, and the assembled
//! chat graph.
//!
//! Workers ([`Worker`]) turn an instruction into an answer; [`ReactWorker`] loops over
//! model turns and tool calls, [`VectorstoreWorker`] answers from the knowledge base.
//! [`SupervisorWorker`] runs a task through a supervisor sub-graph. Graph nodes wrap
//! workers: [`ExecuteStepNode`] for plan steps, [`WorkerNode`] for supervisor dispatch
//! and single-agent answers.

mod chat_graph;
mod filesystem;
mod planning;
mod react;
mod supervisor;
mod vectorstore;
mod worker;

pub use chat_graph::{build_chat_graph, route_after_retrieval, route_entry, AgentMode, ChatDeps, AGENT, PLAN_WORKER};
pub use filesystem::{filesystem_worker, FilesystemPolicy, FILE_WRITE, TERMINAL_FILE_TOOLS};
pub use planning::{
    add_planning_nodes, route_after_replan, ExecuteStepNode, PlannerNode, ReplanDecision, ReplanNode,
    EXECUTE_STEP, MAX_PLAN_STEPS, MAX_SUBSTEPS, PLANNER, PLAN_STEP, REPLAN,
};
pub use react::{DefaultPolicy, ReactWorker, ToolPolicy, DEFAULT_MAX_ITERATIONS, TOOL_ERROR_TEMPLATE};
pub use supervisor::{
    add_supervisor_nodes, route_supervisor, AskUserNode, SupervisedWorkers, SupervisorNode,
    SupervisorWorker, WorkerNode, ASK_USER, BROWSER_WORKER, FS_WORKER, SHELL_WORKER, SUPERVISOR,
    VECTORSTORE_WORKER, WORKERS,
};
pub use vectorstore::{VectorstoreWorker, NO_DOCUMENTS_ANSWER};
pub use worker::{Worker, WorkerOutcome, WorkerTask};
