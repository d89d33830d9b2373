//! Grade-documents node: keeps the documents the LLM judges relevant.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentError;
use crate::graph::{GraphState, Node, NodeOutput, RunContext, StateUpdate};
use crate::llm::{structured, LlmClient, OutputSchema};
use crate::message::{last_n, Message};
use crate::prompts;
use crate::state::{ChatState, DOCUMENTS, LAST_NODE};

use super::Document;

pub const GRADE_DOCUMENTS: &str = "grade_documents";

const GRADE_CONTEXT_MESSAGES: usize = 3;

#[derive(Deserialize)]
struct Grade {
    relevant: bool,
}

fn grade_schema() -> OutputSchema {
    OutputSchema::new(
        "grade",
        "Whether the document is relevant to the user question.",
        json!({
            "type": "object",
            "properties": {"relevant": {"type": "boolean"}},
            "required": ["relevant"],
        }),
    )
}

/// Asks one binary relevance question per document, all concurrently.
///
/// Survivors are written in completion order. Any failed grading fails the node.
pub struct GradeDocumentsNode {
    llm: Arc<dyn LlmClient>,
}

impl GradeDocumentsNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn grade(&self, document: Document, context: &[Message]) -> Result<Option<Document>, AgentError> {
        let mut messages = vec![
            Message::system(prompts::GRADE_SYSTEM),
            Message::user(format!("Retrieved document:\n{}", document.page_content)),
        ];
        messages.extend_from_slice(context);
        let grade: Grade = structured(self.llm.as_ref(), &messages, &grade_schema()).await?;
        Ok(grade.relevant.then_some(document))
    }
}

#[async_trait]
impl Node for GradeDocumentsNode {
    fn id(&self) -> &str {
        GRADE_DOCUMENTS
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let context = last_n(&chat.messages, GRADE_CONTEXT_MESSAGES);
        let total = chat.documents.len();

        let mut pending: FuturesUnordered<_> = chat
            .documents
            .iter()
            .cloned()
            .map(|d| self.grade(d, context))
            .collect();
        let mut kept = Vec::new();
        while let Some(graded) = pending.next().await {
            kept.extend(graded?);
        }
        tracing::debug!(total, kept = kept.len(), "graded documents");

        Ok(StateUpdate::new()
            .write(DOCUMENTS, &kept)?
            .set(LAST_NODE, json!(GRADE_DOCUMENTS))
            .into())
    }
}
