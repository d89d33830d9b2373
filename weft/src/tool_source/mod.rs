//! Tool source abstraction: list tools and call a tool.
//!
//! Workers depend on `ToolSource` instead of a concrete tool registry. Implementations:
//! `MockToolSource` (tests), `McpHttpToolSource` (MCP server over Streamable HTTP) and
//! `ScopedTools` (a capability slice of a [`Toolkit`]).

mod mcp_http;
mod mock;
mod toolkit;

pub use mcp_http::McpHttpToolSource;
pub use mock::MockToolSource;
pub use toolkit::{Capability, ScopedTools, Toolkit};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Tool specification, aligned with an MCP `tools/list` result item.
///
/// **Interaction**: returned by `ToolSource::list_tools()`; passed to the LLM through
/// `CompletionOptions::tools`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    /// Tool name used in `tools/call`.
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema for arguments (MCP `inputSchema`).
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// Result text of one tool call (MCP `result.content[].text` joined).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallContent {
    pub text: String,
}

/// Errors from listing or calling tools.
///
/// **Interaction**: nodes convert them into `AgentError::Tool` when they are fatal;
/// ReAct workers report call failures back to the model as tool messages instead.
#[derive(Debug, Error)]
pub enum ToolSourceError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidInput(String),
    #[error("MCP/transport error: {0}")]
    Transport(String),
    #[error("JSON-RPC error: {0}")]
    JsonRpc(String),
}

/// A named set of callable tools.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Available tools (MCP `tools/list`).
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError>;

    /// Calls a tool by name with JSON arguments (MCP `tools/call`).
    async fn call_tool(&self, name: &str, arguments: Value)
        -> Result<ToolCallContent, ToolSourceError>;
}
