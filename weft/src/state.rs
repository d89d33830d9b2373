//! Chat graph state: channel names, their reducers, and a typed read view.
//!
//! | channel       | reducer            | holds                                   |
//! |---------------|--------------------|-----------------------------------------|
//! | `messages`    | `Append`           | conversation, `Vec<Message>`            |
//! | `documents`   | `ReplaceIfPresent` | retrieved and graded `Vec<Document>`    |
//! | `plan`        | `ReplaceIfPresent` | remaining `Vec<PlanStep>`               |
//! | `past_steps`  | `Append`           | executed `Vec<PastStep>`                |
//! | `last_node`   | `LastValue`        | id of the last node that wrote          |
//! | `next`        | `ReplaceIfPresent` | supervisor routing decision             |
//! | `instruction` | `ReplaceIfPresent` | supervisor instruction for the worker   |
//! | `queries`     | `LastValue`        | generated `QuerySet`                    |
//! | `flags`       | `LastValue`        | per-run `ChatFlags`                     |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::channels::{Append, LastValue, ReplaceIfPresent};
use crate::error::AgentError;
use crate::graph::{GraphState, StateGraph, END};
use crate::message::Message;
use crate::retrieval::Document;

pub const MESSAGES: &str = "messages";
pub const DOCUMENTS: &str = "documents";
pub const PLAN: &str = "plan";
pub const PAST_STEPS: &str = "past_steps";
pub const LAST_NODE: &str = "last_node";
pub const NEXT: &str = "next";
pub const INSTRUCTION: &str = "instruction";
pub const QUERIES: &str = "queries";
pub const FLAGS: &str = "flags";

/// Step tag of the final planning answer.
pub const RESPONSE_STEP: &str = "Response";

/// Per-run switches supplied with the user's message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFlags {
    /// Scopes vector search to this project; `None` disables vector retrieval.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub web_search: bool,
    /// "Smart mode": plan, execute step by step, replan.
    #[serde(default)]
    pub planner_mode: bool,
    /// `metadata.source` values never returned by vector search.
    #[serde(default)]
    pub excluded_documents: Vec<String>,
}

impl ChatFlags {
    /// Whether any retrieval source is enabled.
    pub fn retrieval_enabled(&self) -> bool {
        self.project_id.is_some() || self.web_search
    }
}

/// Queries produced by the generate-query node. Each list is absent or holds 1 to 3 items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySet {
    #[serde(default)]
    pub vector_store_queries: Option<Vec<String>>,
    #[serde(default)]
    pub web_search_queries: Option<Vec<String>>,
}

impl QuerySet {
    pub fn is_empty(&self) -> bool {
        self.vector_store_queries.is_none() && self.web_search_queries.is_none()
    }
}

/// One plan step; `substeps` carry 1 to 4 hints on how to do it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default)]
    pub substeps: Vec<String>,
}

impl PlanStep {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            substeps: Vec::new(),
        }
    }

    /// Description followed by the substeps, one per line.
    pub fn as_instruction(&self) -> String {
        if self.substeps.is_empty() {
            return self.description.clone();
        }
        format!("{}\nSubsteps:\n{}", self.description, self.substeps.join("\n"))
    }
}

/// An executed step and what the worker answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastStep {
    pub step: PlanStep,
    pub result: String,
}

/// Typed snapshot of the chat channels, read by nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub documents: Vec<Document>,
    pub plan: Vec<PlanStep>,
    pub past_steps: Vec<PastStep>,
    pub last_node: Option<String>,
    pub next: String,
    pub instruction: String,
    pub queries: Option<QuerySet>,
    pub flags: ChatFlags,
}

impl ChatState {
    pub fn from_state(state: &GraphState) -> Result<Self, AgentError> {
        Ok(Self {
            messages: state.get_or_default(MESSAGES)?,
            documents: state.get_or_default(DOCUMENTS)?,
            plan: state.get_or_default(PLAN)?,
            past_steps: state.get_or_default(PAST_STEPS)?,
            last_node: state.get_as(LAST_NODE)?,
            next: state.get_as(NEXT)?.unwrap_or_else(|| END.to_string()),
            instruction: state.get_or_default(INSTRUCTION)?,
            queries: state.get_as(QUERIES)?,
            flags: state.get_or_default(FLAGS)?,
        })
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Content of the most recent user message.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content())
    }
}

/// Declares every chat channel on `graph`.
pub fn add_chat_channels(graph: &mut StateGraph) -> &mut StateGraph {
    graph
        .add_channel(MESSAGES, Arc::new(Append::new()))
        .add_channel(DOCUMENTS, Arc::new(ReplaceIfPresent::with_default(json!([]))))
        .add_channel(PLAN, Arc::new(ReplaceIfPresent::with_default(json!([]))))
        .add_channel(PAST_STEPS, Arc::new(Append::new()))
        .add_channel(LAST_NODE, Arc::new(LastValue::new()))
        .add_channel(NEXT, Arc::new(ReplaceIfPresent::with_default(END)))
        .add_channel(INSTRUCTION, Arc::new(ReplaceIfPresent::with_default("")))
        .add_channel(QUERIES, Arc::new(LastValue::new()))
        .add_channel(FLAGS, Arc::new(LastValue::new()))
}

/// Graph input for one user turn.
pub fn chat_input(message: Message, flags: &ChatFlags) -> Value {
    json!({
        MESSAGES: [message],
        FLAGS: flags,
    })
}
