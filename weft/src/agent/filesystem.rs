//! Filesystem worker policy.
//!
//! `file_write` with empty content is a request to synthesize the file from the whole
//! conversation: the content is generated by a dedicated model call before the write
//! runs. Reads end the worker with the file contents.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::llm::{CompletionOptions, LlmClient};
use crate::message::{Message, ToolCall};
use crate::prompts;
use crate::tool_source::ToolSource;

use super::react::{ReactWorker, ToolPolicy};

pub const FILE_WRITE: &str = "file_write";
pub const TERMINAL_FILE_TOOLS: &[&str] = &["file_read", "file_read_image"];

/// Content synthesis for empty writes, terminal reads.
pub struct FilesystemPolicy {
    llm: Arc<dyn LlmClient>,
}

impl FilesystemPolicy {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn needs_content(call: &ToolCall) -> bool {
        call.name == FILE_WRITE
            && call
                .arguments
                .get("content")
                .and_then(Value::as_str)
                .map(str::is_empty)
                .unwrap_or(true)
    }
}

#[async_trait]
impl ToolPolicy for FilesystemPolicy {
    async fn prepare(&self, mut call: ToolCall, conversation: &[Message]) -> Result<ToolCall, AgentError> {
        if !Self::needs_content(&call) {
            return Ok(call);
        }
        let mut messages = vec![Message::system(prompts::FILE_WRITE_SYSTEM)];
        messages.extend(
            conversation
                .iter()
                .filter(|m| !matches!(m, Message::System { .. }))
                .cloned(),
        );
        let content = self
            .llm
            .complete(&messages, &CompletionOptions::default())
            .await?
            .content;
        tracing::debug!(bytes = content.len(), "synthesized file content");
        match &mut call.arguments {
            Value::Object(args) => {
                args.insert("content".to_string(), Value::String(content));
            }
            other => *other = json!({"content": content}),
        }
        Ok(call)
    }

    fn ends_worker(&self, tool: &str) -> bool {
        TERMINAL_FILE_TOOLS.contains(&tool)
    }
}

/// Filesystem worker over `tools`.
pub fn filesystem_worker(
    name: impl Into<String>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolSource>,
) -> ReactWorker {
    ReactWorker::new(name, llm.clone(), tools, prompts::FS_WORKER_SYSTEM)
        .with_policy(Arc::new(FilesystemPolicy::new(llm)))
}
