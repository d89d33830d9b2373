//! ReAct worker: alternate model turns and tool calls until the model answers without
//! tools, a terminal tool ran, or the iteration limit is reached.
//!
//! Tool calls of one turn run concurrently. A failed call is reported back to the model
//! as a tool message and does not end the loop.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::AgentError;
use crate::llm::{CompletionOptions, LlmClient};
use crate::message::{Message, ToolCall};
use crate::prompts;
use crate::retrieval::format_documents;
use crate::tool_source::ToolSource;

use super::worker::{Worker, WorkerOutcome, WorkerTask};

/// Default model turns per worker run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Message sent to the model when a tool call fails.
pub const TOOL_ERROR_TEMPLATE: &str =
    "Error executing tool '{tool_name}' with arguments {tool_args}:\n {error}\n Please fix the error and try again.";

/// Per-capability hooks around tool execution.
#[async_trait]
pub trait ToolPolicy: Send + Sync {
    /// Rewrites a call before it runs. `conversation` is everything the worker has seen.
    async fn prepare(&self, call: ToolCall, _conversation: &[Message]) -> Result<ToolCall, AgentError> {
        Ok(call)
    }

    /// Whether a successful call to `tool` ends the worker with the tool's output.
    fn ends_worker(&self, _tool: &str) -> bool {
        false
    }
}

/// Runs every call unchanged; no tool is terminal.
pub struct DefaultPolicy;

impl ToolPolicy for DefaultPolicy {}

struct CallResult {
    message: Message,
    terminal_output: Option<String>,
}

/// Tool-equipped worker.
///
/// **Interaction**: implements `Worker`; built per capability by `build_chat_graph`
/// with a `ScopedTools` slice of the toolkit.
pub struct ReactWorker {
    name: String,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolSource>,
    system_prompt: String,
    max_iterations: usize,
    policy: Arc<dyn ToolPolicy>,
}

impl ReactWorker {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolSource>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            policy: Arc::new(DefaultPolicy),
        }
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn ToolPolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn initial_messages(&self, task: &WorkerTask) -> Vec<Message> {
        let context = format_documents(&task.documents);
        let system = if context.is_empty() {
            self.system_prompt.clone()
        } else {
            format!("{}\n\nRetrieved context:\n{}", self.system_prompt, context)
        };
        let mut messages = vec![Message::system(system)];
        messages.extend(task.messages.iter().cloned());
        if !task.instruction.is_empty() {
            messages.push(Message::user(prompts::worker_instruction(&task.instruction)));
        }
        messages
    }

    async fn execute(&self, call: ToolCall, conversation: &[Message]) -> Result<CallResult, AgentError> {
        let call = self.policy.prepare(call, conversation).await?;
        let (text, ok) = match self.tools.call_tool(&call.name, call.arguments.clone()).await {
            Ok(content) => (content.text, true),
            Err(error) => {
                tracing::warn!(worker = %self.name, tool = %call.name, %error, "tool call failed");
                let text = TOOL_ERROR_TEMPLATE
                    .replace("{tool_name}", &call.name)
                    .replace("{tool_args}", &call.arguments.to_string())
                    .replace("{error}", &error.to_string());
                (text, false)
            }
        };
        let terminal_output = (ok && self.policy.ends_worker(&call.name)).then(|| text.clone());
        Ok(CallResult {
            message: Message::tool(call.id, call.name, text),
            terminal_output,
        })
    }
}

#[async_trait]
impl Worker for ReactWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, task: WorkerTask) -> Result<WorkerOutcome, AgentError> {
        let specs = self.tools.list_tools().await?;
        let options = CompletionOptions::with_tools(specs);
        let mut messages = self.initial_messages(&task);
        let first_new = messages.len();

        for turn in 0..self.max_iterations {
            let response = self.llm.complete(&messages, &options).await?;
            if response.tool_calls.is_empty() {
                let answer = response.content.clone();
                messages.push(response.into_message());
                tracing::debug!(worker = %self.name, turn, "worker answered");
                return Ok(WorkerOutcome {
                    answer,
                    transcript: messages.split_off(first_new),
                    question: None,
                });
            }

            let calls = response.tool_calls.clone();
            messages.push(response.into_message());
            let results = join_all(calls.into_iter().map(|c| self.execute(c, &messages))).await;
            let mut terminal = Vec::new();
            for result in results {
                let result = result?;
                terminal.extend(result.terminal_output);
                messages.push(result.message);
            }
            if !terminal.is_empty() {
                tracing::debug!(worker = %self.name, turn, "terminal tool ended worker");
                return Ok(WorkerOutcome {
                    answer: terminal.join("\n"),
                    transcript: messages.split_off(first_new),
                    question: None,
                });
            }
        }

        tracing::warn!(worker = %self.name, max = self.max_iterations, "worker hit its iteration limit");
        let answer = messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }) && !m.content().is_empty())
            .map(|m| m.content().to_string())
            .unwrap_or_else(|| format!("Stopped after {} iterations without an answer.", self.max_iterations));
        Ok(WorkerOutcome {
            answer,
            transcript: messages.split_off(first_new),
            question: None,
        })
    }
}
