//! Retrieve node: runs every generated query concurrently and collects the documents.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;

use crate::error::AgentError;
use crate::graph::{GraphState, Node, NodeOutput, RunContext, StateUpdate};
use crate::state::{ChatState, DOCUMENTS, LAST_NODE};

use super::{Document, RetrievalError, Retriever};

pub const RETRIEVE: &str = "retrieve";

/// Writes the documents of all queries to `documents`.
///
/// A failing query is logged and contributes nothing; its siblings are unaffected.
pub struct RetrieveNode {
    retriever: Arc<Retriever>,
}

impl RetrieveNode {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Node for RetrieveNode {
    fn id(&self) -> &str {
        RETRIEVE
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let queries = chat.queries.unwrap_or_default();
        let flags = &chat.flags;

        let mut searches: Vec<(&str, BoxFuture<'_, Result<Vec<Document>, RetrievalError>>)> =
            Vec::new();
        for q in queries.vector_store_queries.iter().flatten() {
            searches.push((q.as_str(), self.retriever.vector_search(q, flags).boxed()));
        }
        for q in queries.web_search_queries.iter().flatten() {
            searches.push((q.as_str(), self.retriever.web_search(q).boxed()));
        }
        let (labels, futures): (Vec<_>, Vec<_>) = searches.into_iter().unzip();

        let mut documents = Vec::new();
        for (query, result) in labels.into_iter().zip(join_all(futures).await) {
            match result {
                Ok(docs) => documents.extend(docs),
                Err(error) => tracing::warn!(query, %error, "retrieval query failed; skipping"),
            }
        }
        tracing::debug!(documents = documents.len(), "retrieved");

        Ok(StateUpdate::new()
            .write(DOCUMENTS, &documents)?
            .set(LAST_NODE, json!(RETRIEVE))
            .into())
    }
}
