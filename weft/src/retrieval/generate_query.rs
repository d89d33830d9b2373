//! Generate-query node: turns the recent conversation into search queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::AgentError;
use crate::graph::{GraphState, Node, NodeOutput, RunContext, StateUpdate};
use crate::llm::{structured, LlmClient, OutputSchema};
use crate::message::{last_n, Message};
use crate::prompts;
use crate::state::{ChatState, QuerySet, LAST_NODE, QUERIES};

pub const GENERATE_QUERY: &str = "generate_query";

/// Messages of context given to the query generator.
const QUERY_CONTEXT_MESSAGES: usize = 5;
const MAX_QUERIES: usize = 3;

fn query_schema() -> OutputSchema {
    let list = json!({
        "type": ["array", "null"],
        "items": {"type": "string"},
        "minItems": 1,
        "maxItems": MAX_QUERIES,
    });
    OutputSchema::new(
        "generate_query",
        "Search queries for the vector store and for web search.",
        json!({
            "type": "object",
            "properties": {
                "vectorStoreQueries": list,
                "webSearchQueries": list,
            },
        }),
    )
}

/// Drops empty lists, rejects lists longer than three.
fn normalize(list: Option<Vec<String>>, enabled: bool, name: &str) -> Result<Option<Vec<String>>, AgentError> {
    let Some(list) = list else {
        return Ok(None);
    };
    if list.len() > MAX_QUERIES {
        return Err(AgentError::StructuredOutput(format!(
            "generate_query: {} has {} queries, at most {} allowed",
            name,
            list.len(),
            MAX_QUERIES
        )));
    }
    Ok((enabled && !list.is_empty()).then_some(list))
}

/// Writes a [`QuerySet`] to `queries`.
///
/// Lists for sources disabled by the flags are dropped. With no source enabled the LLM
/// is not called and an empty set is written.
pub struct GenerateQueryNode {
    llm: Arc<dyn LlmClient>,
}

impl GenerateQueryNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for GenerateQueryNode {
    fn id(&self) -> &str {
        GENERATE_QUERY
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let vector = chat.flags.project_id.is_some();
        let web = chat.flags.web_search;

        let queries = if vector || web {
            let mut messages = vec![Message::system(prompts::generate_query_prompt(vector, web))];
            messages.extend_from_slice(last_n(&chat.messages, QUERY_CONTEXT_MESSAGES));
            let raw: QuerySet = structured(self.llm.as_ref(), &messages, &query_schema()).await?;
            QuerySet {
                vector_store_queries: normalize(raw.vector_store_queries, vector, "vectorStoreQueries")?,
                web_search_queries: normalize(raw.web_search_queries, web, "webSearchQueries")?,
            }
        } else {
            QuerySet::default()
        };
        tracing::debug!(?queries, "generated queries");

        Ok(StateUpdate::new()
            .write(QUERIES, &queries)?
            .set(LAST_NODE, json!(GENERATE_QUERY))
            .into())
    }
}
