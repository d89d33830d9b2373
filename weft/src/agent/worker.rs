//! Worker contract shared by ReAct workers and the vectorstore worker.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::message::Message;
use crate::retrieval::Document;
use crate::state::{ChatFlags, ChatState};

/// What a worker is asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerTask {
    /// Supervisor instruction or plan step. Empty means "answer the conversation".
    pub instruction: String,
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Graded documents from retrieval.
    pub documents: Vec<Document>,
    pub flags: ChatFlags,
}

impl WorkerTask {
    pub fn from_chat(chat: &ChatState, instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            messages: chat.messages.clone(),
            documents: chat.documents.clone(),
            flags: chat.flags.clone(),
        }
    }

    /// The instruction, or the latest user message when there is none.
    pub fn objective(&self) -> &str {
        if !self.instruction.is_empty() {
            return &self.instruction;
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content())
            .unwrap_or_default()
    }
}

/// Result of one worker run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerOutcome {
    /// Final answer reported back to the graph.
    pub answer: String,
    /// Messages the worker produced on the way (assistant turns, tool results).
    pub transcript: Vec<Message>,
    /// Set when the worker stopped to ask the user; `answer` is empty then.
    pub question: Option<String>,
}

/// A capability-scoped agent that turns a task into an answer.
///
/// **Interaction**: run by `WorkerNode` (supervisor and single-agent answers) and by
/// `ExecuteStepNode` (planning).
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, task: WorkerTask) -> Result<WorkerOutcome, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_falls_back_to_last_user_message() {
        let mut task = WorkerTask {
            messages: vec![Message::user("first"), Message::assistant("a"), Message::user("second")],
            ..WorkerTask::default()
        };
        assert_eq!(task.objective(), "second");
        task.instruction = "list files".into();
        assert_eq!(task.objective(), "list files");
    }
}
