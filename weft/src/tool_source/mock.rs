//! In-process tool source for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

type Handler = Arc<dyn Fn(&Value) -> Result<String, ToolSourceError> + Send + Sync>;

/// Tools with closure handlers; records every call.
///
/// **Interaction**: implements `ToolSource`; fed to `Toolkit::load` and ReAct workers in
/// tests. `failing()` simulates an unreachable server.
#[derive(Default)]
pub struct MockToolSource {
    specs: Vec<ToolSpec>,
    handlers: HashMap<String, Handler>,
    list_error: Option<String>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockToolSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool answering with `handler(arguments)`.
    pub fn with_tool<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<String, ToolSourceError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.specs.push(ToolSpec::new(
            name.clone(),
            format!("mock tool {}", name),
            json!({"type": "object"}),
        ));
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    /// Adds a tool that always answers `text`.
    pub fn with_text_tool(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_tool(name, move |_| Ok(text.clone()))
    }

    /// `list_tools` fails with a transport error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            list_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// `(tool, arguments)` of every call, in call order.
    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ToolSource for MockToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        match &self.list_error {
            Some(message) => Err(ToolSourceError::Transport(message.clone())),
            None => Ok(self.specs.clone()),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        self.calls.lock().await.push((name.to_string(), arguments.clone()));
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolSourceError::NotFound(name.to_string()))?;
        Ok(ToolCallContent {
            text: handler(&arguments)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: registered tools are listed and called; unknown tools are NotFound.
    #[tokio::test]
    async fn lists_and_calls() {
        let source = MockToolSource::new()
            .with_text_tool("shell_exec", "ok")
            .with_tool("file_read", |args| {
                Ok(format!("contents of {}", args["path"].as_str().unwrap_or("?")))
            });
        let names: Vec<String> = source
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["shell_exec", "file_read"]);
        let out = source
            .call_tool("file_read", json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(out.text, "contents of a.txt");
        assert!(matches!(
            source.call_tool("nope", json!({})).await,
            Err(ToolSourceError::NotFound(_))
        ));
        assert_eq!(source.calls().await.len(), 2);
    }
}
