//! Scripted LLM for tests.
//!
//! `complete` walks a list of responses and repeats the last one once exhausted.
//! `complete_structured` answers from a per-schema queue, then from an optional
//! closure that can inspect the prompt (e.g. grade documents by their content).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::message::Message;

use super::{CompletionOptions, LlmClient, LlmError, LlmResponse, OutputSchema};

/// Prompt-aware structured answer. `None` means "no answer" (`LlmError::NoResponse`).
pub type StructuredFn =
    Arc<dyn Fn(&OutputSchema, &[Message]) -> Option<Result<Value, LlmError>> + Send + Sync>;

/// Mock LLM with scripted text and structured answers.
///
/// **Interaction**: implements `LlmClient`; used by node and graph tests.
#[derive(Default)]
pub struct MockLlm {
    responses: Vec<LlmResponse>,
    cursor: AtomicUsize,
    structured: Mutex<HashMap<String, VecDeque<Value>>>,
    structured_fn: Option<StructuredFn>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    /// Always answers `content` without tool calls.
    pub fn with_text(content: impl Into<String>) -> Self {
        Self::with_responses(vec![LlmResponse::text(content)])
    }

    /// Answers in order, then repeats the last response.
    pub fn with_responses(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses,
            ..Self::default()
        }
    }

    /// Queues structured answers for schema `name`; the last one repeats.
    pub fn with_structured(self, name: impl Into<String>, values: Vec<Value>) -> Self {
        let mut map = self.structured.into_inner();
        map.entry(name.into()).or_default().extend(values);
        Self {
            structured: Mutex::new(map),
            ..self
        }
    }

    /// Fallback for schemas without a queued answer.
    pub fn with_structured_fn(mut self, f: StructuredFn) -> Self {
        self.structured_fn = Some(f);
        self
    }

    /// Message lists of every call so far, in call order.
    pub async fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.lock().await.push(messages.to_vec());
        let n = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(n)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or(LlmError::NoResponse)
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        self.calls.lock().await.push(messages.to_vec());
        {
            let mut queues = self.structured.lock().await;
            if let Some(queue) = queues.get_mut(&schema.name) {
                let next = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                if let Some(v) = next {
                    return Ok(v);
                }
            }
        }
        match &self.structured_fn {
            Some(f) => f(schema, messages).unwrap_or(Err(LlmError::NoResponse)),
            None => Err(LlmError::NoResponse),
        }
    }
}
