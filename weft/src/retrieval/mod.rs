//! Retrieval sub-graph: generate queries, retrieve, grade.
//!
//! `START → generate_query → retrieve → grade_documents`. [`add_retrieval_nodes`] adds
//! the three nodes to a larger graph; [`build_retrieval_graph`] compiles them on their
//! own, ending after grading.

mod document;
mod error;
mod generate_query;
mod grade;
mod loader;
mod retrieve;
mod retriever;
mod web_search;

pub use document::{format_documents, Document};
pub use error::RetrievalError;
pub use generate_query::{GenerateQueryNode, GENERATE_QUERY};
pub use grade::{GradeDocumentsNode, GRADE_DOCUMENTS};
pub use loader::{load_or_empty, DocumentDescriptor, DocumentLoader, HttpDocumentLoader};
pub use retrieve::{RetrieveNode, RETRIEVE};
pub use retriever::{Retriever, VectorIndex, DEFAULT_TOP_K};
pub use web_search::{TavilySearch, WebResult, WebSearch, WebSearchChain};

use std::sync::Arc;

use crate::graph::{CompilationError, CompiledStateGraph, StateGraph, END, START};
use crate::llm::LlmClient;
use crate::memory::Checkpointer;
use crate::state::add_chat_channels;

/// Adds the three retrieval nodes and the edges between them. The caller wires the
/// entry into `generate_query` and the exit out of `grade_documents`.
pub fn add_retrieval_nodes(
    graph: &mut StateGraph,
    llm: Arc<dyn LlmClient>,
    retriever: Arc<Retriever>,
) -> &mut StateGraph {
    graph
        .add_node(GENERATE_QUERY, Arc::new(GenerateQueryNode::new(llm.clone())))
        .add_node(RETRIEVE, Arc::new(RetrieveNode::new(retriever)))
        .add_node(GRADE_DOCUMENTS, Arc::new(GradeDocumentsNode::new(llm)))
        .add_edge(GENERATE_QUERY, RETRIEVE)
        .add_edge(RETRIEVE, GRADE_DOCUMENTS)
}

/// Standalone retrieval graph over the chat channels.
pub fn build_retrieval_graph(
    llm: Arc<dyn LlmClient>,
    retriever: Arc<Retriever>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> Result<CompiledStateGraph, CompilationError> {
    let mut graph = StateGraph::new();
    add_chat_channels(&mut graph);
    add_retrieval_nodes(&mut graph, llm, retriever)
        .add_edge(START, GENERATE_QUERY)
        .add_edge(GRADE_DOCUMENTS, END);
    match checkpointer {
        Some(c) => graph.compile_with_checkpointer(c),
        None => graph.compile(),
    }
}
