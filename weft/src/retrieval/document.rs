//! Retrieved documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text plus free-form metadata (`projectId`, `source`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// `metadata.source` when it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Joins document contents for a prompt, separated by blank lines.
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
