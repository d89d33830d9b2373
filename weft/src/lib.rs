//! # Weft
//!
//! Chat agent orchestration on a Pregel-style graph engine with durable checkpoints.
//!
//! A conversation turn runs through one compiled [`StateGraph`]: optional retrieval
//! (generate queries, retrieve, grade), then either a plan-execute-replan loop or a
//! direct answer by a single ReAct agent or a supervisor over capability-scoped
//! workers. Every superstep is committed through a [`Checkpointer`], so a run that
//! suspends to ask the user can be resumed later from exactly that node.
//!
//! ## Main modules
//!
//! - [`graph`]: [`StateGraph`], [`CompiledStateGraph`], [`Node`], [`NodeOutput`],
//!   [`RunContext`]; invoke, stream, resume, state inspection.
//! - [`channels`]: reducers ([`LastValue`], [`ReplaceIfPresent`], [`Append`],
//!   [`BinaryOperatorAggregate`]).
//! - [`memory`]: [`Checkpointer`] with [`MemorySaver`] and [`SqliteSaver`].
//! - [`retrieval`]: query generation, vector and web retrieval, document grading.
//! - [`agent`]: workers, planning, supervisor, and [`build_chat_graph`].
//! - [`llm`], [`vector`], [`tool_source`]: external capability boundaries with test fakes.
//! - [`stream`] and [`protocol`]: engine events and their wire shape.
//! - [`config`]: [`WeftConfig`] from the environment.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weft::{build_chat_graph, chat_input, AgentMode, ChatDeps, ChatFlags, Message, MockLlm,
//!            Retriever, RunnableConfig, MemorySaver, Toolkit};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let deps = ChatDeps::new(Arc::new(MockLlm::with_text("hi")), Arc::new(Retriever::default()), Toolkit::default());
//! let graph = build_chat_graph(&deps, AgentMode::Single, Some(Arc::new(MemorySaver::new())))?;
//! let config = RunnableConfig::for_thread("thread-1");
//! let outcome = graph.invoke(chat_input(Message::user("hello"), &ChatFlags::default()), &config).await?;
//! println!("{:?}", outcome.state().get("messages"));
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod message;
pub mod prompts;
pub mod protocol;
pub mod retrieval;
pub mod state;
pub mod stream;
pub mod tool_source;
pub mod vector;

pub use agent::{
    build_chat_graph, AgentMode, ChatDeps, ReactWorker, VectorstoreWorker, Worker, WorkerOutcome,
    WorkerTask,
};
pub use channels::{Append, BinaryOperatorAggregate, ChannelError, LastValue, ReplaceIfPresent};
pub use config::{ConfigError, WeftConfig};
pub use error::{AgentError, GraphError};
pub use graph::{
    CompilationError, CompiledStateGraph, GraphState, Interrupt, Node, NodeOutput, RunContext,
    RunOutcome, StateGraph, StateSnapshot, StateUpdate, END, START,
};
pub use llm::{LlmClient, LlmError, LlmResponse, MockLlm, OutputSchema};
pub use memory::{CheckpointError, Checkpointer, MemorySaver, RunnableConfig, SqliteSaver};
pub use message::{Message, ToolCall};
pub use protocol::to_protocol_event;
pub use retrieval::{Document, RetrievalError, Retriever, VectorIndex, WebSearchChain};
pub use state::{chat_input, ChatFlags, ChatState, PastStep, PlanStep};
pub use stream::{StreamEvent, StreamMode};
pub use tool_source::{MockToolSource, ToolSource, ToolSourceError, ToolSpec, Toolkit};
pub use vector::{Embedder, HashEmbedder, InMemoryVectorStore, MetadataFilter, VectorStore};
