//! Conversation messages carried in the `messages` channel.
//!
//! Roles: System, User, Assistant (optionally with tool calls and a plan-step tag), Tool.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON object with the tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        /// Plan step that produced this message; `"Response"` marks the final answer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            step: None,
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
            step: None,
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Tags an assistant message with a plan step. No-op for other roles.
    pub fn with_step(mut self, tag: impl Into<String>) -> Self {
        if let Self::Assistant { step, .. } = &mut self {
            *step = Some(tag.into());
        }
        self
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Assistant { step, .. } => step.as_deref(),
            _ => None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// Last `n` messages, oldest first.
pub fn last_n(messages: &[Message], n: usize) -> &[Message] {
    &messages[messages.len().saturating_sub(n)..]
}

/// Plain-text transcript (`role: content` per line) for prompts that take a single string.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role(), m.content()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Messages serialize with a `role` tag and round-trip.
    #[test]
    fn message_serde_uses_role_tag() {
        let msg = Message::assistant("done").with_step("Response");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({"role": "assistant", "content": "done", "step": "Response"}));
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, msg);
    }

    /// **Scenario**: with_step only tags assistant messages.
    #[test]
    fn with_step_ignores_non_assistant() {
        assert_eq!(Message::user("hi").with_step("x").step(), None);
        assert_eq!(Message::assistant("a").with_step("x").step(), Some("x"));
    }

    /// **Scenario**: last_n returns the tail, or everything when shorter.
    #[test]
    fn last_n_takes_tail() {
        let msgs: Vec<Message> = (0..7).map(|i| Message::user(i.to_string())).collect();
        let tail = last_n(&msgs, 5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].content(), "2");
        assert_eq!(last_n(&msgs[..2], 5).len(), 2);
    }
}
