//! MCP tool source over Streamable HTTP: POST JSON-RPC to a URL, parse JSON or SSE bodies.
//!
//! `connect` performs the `initialize` handshake, captures `MCP-Session-Id` and sends
//! `notifications/initialized`. `tools/list` and `tools/call` are single POSTs.
//!
//! **Interaction**: built by `WeftConfig::tool_sources` for each `WEFT_MCP_SERVERS`
//! entry; grouped into capabilities by `Toolkit::load`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

impl JsonRpcResponse {
    fn is_reply(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    fn into_result(self) -> Result<Value, ToolSourceError> {
        if let Some(err) = self.error {
            return Err(ToolSourceError::JsonRpc(format!("{} ({})", err.message, err.code)));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// First JSON-RPC reply in an `application/json` or `text/event-stream` body.
fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&HeaderValue>,
) -> Result<JsonRpcResponse, ToolSourceError> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);
    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| ToolSourceError::Transport(format!("response json: {}", e)));
    }

    let reply = |data: &str| {
        serde_json::from_str::<JsonRpcResponse>(data)
            .ok()
            .filter(JsonRpcResponse::is_reply)
    };
    let mut event = String::new();
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim_start();
            if data == "[DONE]" {
                continue;
            }
            if !event.is_empty() {
                event.push('\n');
            }
            event.push_str(data);
        } else if line.trim().is_empty() && !event.is_empty() {
            if let Some(r) = reply(&event) {
                return Ok(r);
            }
            event.clear();
        }
    }
    if let Some(r) = reply(&event) {
        return Ok(r);
    }
    Err(ToolSourceError::Transport(
        "SSE stream: no JSON-RPC response (result/error) found".into(),
    ))
}

/// Maps a `tools/list` result to specs.
fn parse_list_tools_result(result: Value) -> Result<Vec<ToolSpec>, ToolSourceError> {
    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolSourceError::Transport("no tools array in response".into()))?;
    tools
        .iter()
        .map(|t| {
            let name = t
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolSourceError::Transport("tool item without name".into()))?;
            Ok(ToolSpec {
                name: name.to_string(),
                description: t.get("description").and_then(Value::as_str).map(String::from),
                input_schema: t.get("inputSchema").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect()
}

/// Joins the text blocks of a `tools/call` result; `structuredContent` when there are none.
fn parse_call_tool_result(result: Value) -> Result<ToolCallContent, ToolSourceError> {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    let mut text = texts.join("\n").trim().to_string();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        if text.is_empty() {
            text = "tool returned error".to_string();
        }
        return Err(ToolSourceError::Transport(text));
    }
    if text.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            text = structured.to_string();
        }
    }
    Ok(ToolCallContent { text })
}

/// Tool source backed by one MCP server over Streamable HTTP.
pub struct McpHttpToolSource {
    name: String,
    client: Client,
    url: String,
    /// Extra headers (API keys) sent on every request.
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl McpHttpToolSource {
    /// Connects and completes the initialize handshake.
    pub async fn connect(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Result<Self, ToolSourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let source = Self {
            name: name.into(),
            client,
            url: url.into(),
            headers,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
        };
        source.initialize().await?;
        Ok(source)
    }

    /// Server name (the `name` in `name=url`).
    pub fn name(&self) -> &str {
        &self.name
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|g| g.clone())
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ToolSourceError> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .json(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id() {
            req = req.header("MCP-Session-Id", sid);
        }
        req.send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))
    }

    async fn initialize(&self) -> Result<(), ToolSourceError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "clientInfo": {"name": "weft", "version": env!("CARGO_PKG_VERSION")},
        });
        let resp = self.post(&self.request_body("initialize", params)).await?;
        if let Some(id) = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(id.to_string());
            }
        }
        if resp.status() != reqwest::StatusCode::ACCEPTED {
            Self::read_reply("initialize", resp).await?;
        }

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {},
        });
        let resp = self.post(&notification).await?;
        let status = resp.status();
        if status != reqwest::StatusCode::ACCEPTED && !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ToolSourceError::Transport(format!(
                "notifications/initialized HTTP {}: {}",
                status, text
            )));
        }
        tracing::debug!(server = %self.name, session = ?self.session_id(), "mcp session initialized");
        Ok(())
    }

    fn request_body(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        json!({
            "jsonrpc": "2.0",
            "id": format!("weft-{}", id),
            "method": method,
            "params": params,
        })
    }

    async fn read_reply(method: &str, resp: reqwest::Response) -> Result<Value, ToolSourceError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ToolSourceError::Transport(format!(
                "{} HTTP {}: {}",
                method,
                status,
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| ToolSourceError::Transport(format!("{} response body: {}", method, e)))?;
        parse_json_rpc_from_body(&text, content_type.as_ref())?.into_result()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolSourceError> {
        let resp = self.post(&self.request_body(method, params)).await?;
        Self::read_reply(method, resp).await
    }
}

#[async_trait]
impl ToolSource for McpHttpToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        parse_list_tools_result(self.request("tools/list", json!({})).await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        parse_call_tool_result(result)
    }
}
