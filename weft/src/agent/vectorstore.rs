//! Vectorstore worker: search the knowledge base, check relevance, rewrite the query
//! once if needed, then answer from the documents with numbered sources.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentError;
use crate::llm::{structured, CompletionOptions, LlmClient, OutputSchema};
use crate::message::Message;
use crate::prompts;
use crate::retrieval::{Document, Retriever};

use super::worker::{Worker, WorkerOutcome, WorkerTask};

pub const NO_DOCUMENTS_ANSWER: &str = "No relevant documents were found in the knowledge base.";

#[derive(Deserialize)]
struct Relevance {
    relevant: bool,
}

fn relevance_schema() -> OutputSchema {
    OutputSchema::new(
        "relevance",
        "Whether the documents are relevant to the question.",
        json!({
            "type": "object",
            "properties": {"relevant": {"type": "boolean"}},
            "required": ["relevant"],
        }),
    )
}

/// Documents numbered `[1]`, `[2]`, ... with their source when known.
fn numbered(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, d)| match d.source() {
            Some(src) => format!("[{}] ({})\n{}", i + 1, src, d.page_content),
            None => format!("[{}]\n{}", i + 1, d.page_content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct VectorstoreWorker {
    name: String,
    llm: Arc<dyn LlmClient>,
    retriever: Arc<Retriever>,
}

impl VectorstoreWorker {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmClient>, retriever: Arc<Retriever>) -> Self {
        Self {
            name: name.into(),
            llm,
            retriever,
        }
    }

    async fn relevant(&self, query: &str, documents: &[Document]) -> Result<bool, AgentError> {
        if documents.is_empty() {
            return Ok(false);
        }
        let messages = [
            Message::system(prompts::RELEVANCE_SYSTEM),
            Message::user(format!(
                "User question: {}\n\nRetrieved documents:\n{}",
                query,
                numbered(documents)
            )),
        ];
        let r: Relevance = structured(self.llm.as_ref(), &messages, &relevance_schema()).await?;
        Ok(r.relevant)
    }

    async fn rewrite(&self, query: &str) -> Result<String, AgentError> {
        let messages = [
            Message::system(prompts::REWRITE_QUERY_SYSTEM),
            Message::user(format!("Original query: {}", query)),
        ];
        let rewritten = self
            .llm
            .complete(&messages, &CompletionOptions::default())
            .await?
            .content
            .trim()
            .to_string();
        Ok(if rewritten.is_empty() {
            query.to_string()
        } else {
            rewritten
        })
    }
}

#[async_trait]
impl Worker for VectorstoreWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, task: WorkerTask) -> Result<WorkerOutcome, AgentError> {
        let mut query = task.objective().to_string();
        let mut documents = self.retriever.vector_search(&query, &task.flags).await?;
        if !self.relevant(&query, &documents).await? {
            query = self.rewrite(&query).await?;
            tracing::debug!(worker = %self.name, %query, "retrying with rewritten query");
            documents = self.retriever.vector_search(&query, &task.flags).await?;
        }
        if documents.is_empty() {
            return Ok(WorkerOutcome {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                transcript: vec![Message::assistant(NO_DOCUMENTS_ANSWER)],
                question: None,
            });
        }

        let messages = [
            Message::system(prompts::ANSWER_FROM_DOCUMENTS_SYSTEM),
            Message::user(format!(
                "User question: {}\n\nRetrieved information:\n{}",
                query,
                numbered(&documents)
            )),
        ];
        let response = self
            .llm
            .complete(&messages, &CompletionOptions::default())
            .await?;
        Ok(WorkerOutcome {
            answer: response.content.clone(),
            transcript: vec![response.into_message()],
            question: None,
        })
    }
}
