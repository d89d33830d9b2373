//! LLM client boundary.
//!
//! Nodes depend on [`LlmClient`]: `complete` returns assistant text and optional tool
//! calls, `complete_structured` returns a JSON value shaped by an [`OutputSchema`].
//! Provider clients live outside this crate; [`MockLlm`] scripts responses for tests.

mod mock;

pub use mock::{MockLlm, StructuredFn};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::AgentError;
use crate::message::{Message, ToolCall};
use crate::tool_source::ToolSpec;

/// Provider failures. Propagated to the calling node, never retried here.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm provider error: {0}")]
    Provider(String),
    #[error("llm returned invalid response: {0}")]
    InvalidResponse(String),
    #[error("llm returned no response")]
    NoResponse,
}

/// Token usage for one call (prompt + completion).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Assistant text plus the tool calls requested in this turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    /// Empty means the model answered without tools.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            usage: None,
        }
    }

    /// Assistant message for the conversation history.
    pub fn into_message(self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.content)
        } else {
            Message::assistant_with_tool_calls(self.content, self.tool_calls)
        }
    }
}

/// Per-call options for `complete`.
#[derive(Clone, Debug, Default)]
pub struct CompletionOptions {
    /// Tools the model may call. Empty disables tool calling.
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn with_tools(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            temperature: None,
        }
    }
}

/// JSON Schema the model's structured answer must follow.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSchema {
    /// Function-style name, e.g. `"grade"`.
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// Chat model capability.
///
/// **Interaction**: held as `Arc<dyn LlmClient>` by retrieval, planning and worker nodes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One chat turn.
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError>;

    /// One chat turn whose answer is a JSON value following `schema`.
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError>;
}

/// Calls `complete_structured` and deserializes the answer.
///
/// Shape mismatches are `AgentError::StructuredOutput`; nothing is coerced.
pub async fn structured<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    messages: &[Message],
    schema: &OutputSchema,
) -> Result<T, AgentError> {
    let value = llm.complete_structured(messages, schema).await?;
    serde_json::from_value(value)
        .map_err(|e| AgentError::StructuredOutput(format!("{}: {}", schema.name, e)))
}
