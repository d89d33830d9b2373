//! Run config: which thread, namespace and (optionally) checkpoint a call addresses.

use serde::{Deserialize, Serialize};

/// Identifies a thread and optionally one checkpoint in it.
///
/// Every checkpoint operation needs `thread_id`. `checkpoint_ns` isolates nested
/// sub-graphs and defaults to empty. When `checkpoint_id` is set, reads return that
/// checkpoint instead of the latest, and `put` records it as the parent of the new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableConfig {
    pub thread_id: Option<String>,
    #[serde(default)]
    pub checkpoint_ns: String,
    pub checkpoint_id: Option<String>,
}

impl RunnableConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.checkpoint_ns = ns.into();
        self
    }

    pub fn with_checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }

    /// Same thread and namespace, latest checkpoint.
    pub fn latest(&self) -> Self {
        Self {
            checkpoint_id: None,
            ..self.clone()
        }
    }
}
