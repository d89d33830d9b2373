//! Checkpoint, metadata and pending-write types shared by every backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::checkpoint_id::next_checkpoint_id;
use super::checkpointer::CheckpointError;
use super::config::RunnableConfig;

/// Checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Reserved write: the task failed.
pub const ERROR: &str = "__error__";
/// Reserved write: the task was scheduled.
pub const SCHEDULED: &str = "__scheduled__";
/// Reserved write: the task suspended with a payload.
pub const INTERRUPT: &str = "__interrupt__";
/// Reserved write: the value the suspended task resumes with.
pub const RESUME: &str = "__resume__";
/// Writes to this channel on a parent checkpoint become the child's `pending_sends`.
pub const TASKS: &str = "__pregel_tasks";

/// Default page size of `Checkpointer::list`.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Fixed index for reserved channels. Writes to these overwrite on repeat; every other
/// channel is first-write-wins per (task, index).
pub fn writes_idx_map(channel: &str) -> Option<i64> {
    match channel {
        ERROR => Some(-1),
        SCHEDULED => Some(-2),
        INTERRUPT => Some(-3),
        RESUME => Some(-4),
        _ => None,
    }
}

/// Channel name to version token. Tokens are zero-padded integers, so string order
/// equals numeric order.
pub type ChannelVersions = BTreeMap<String, String>;

/// Version token for the n-th version of a channel.
pub fn version_token(n: u64) -> String {
    format!("{:020}", n)
}

/// Parses a version token back to its counter. Unknown formats count as 0.
pub fn parse_version(token: &str) -> u64 {
    token.parse().unwrap_or(0)
}

/// Snapshot of graph progress after one superstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub v: u32,
    pub id: String,
    /// RFC 3339 creation time.
    pub ts: String,
    /// Hydrated from blobs on read; backends never store it inline.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channel_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub channel_versions: ChannelVersions,
    /// Node id to the channel versions it had seen when it last ran.
    #[serde(default)]
    pub versions_seen: BTreeMap<String, ChannelVersions>,
    #[serde(default)]
    pub pending_sends: Vec<Value>,
}

impl Checkpoint {
    /// Empty checkpoint with a fresh time-ordered id.
    pub fn new() -> Self {
        Self {
            v: CHECKPOINT_VERSION,
            id: next_checkpoint_id(),
            ts: chrono::Utc::now().to_rfc3339(),
            channel_values: BTreeMap::new(),
            channel_versions: ChannelVersions::new(),
            versions_seen: BTreeMap::new(),
            pending_sends: Vec::new(),
        }
    }

    /// Copy without `channel_values`, as stored in the checkpoint row.
    pub fn without_values(&self) -> Self {
        Self {
            channel_values: BTreeMap::new(),
            ..self.clone()
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

/// What produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Input applied before the first superstep.
    Input,
    /// A superstep of the run loop.
    #[default]
    Loop,
    /// Manual state update.
    Update,
    /// Copy of another checkpoint.
    Fork,
}

/// Metadata attached to a checkpoint; free-form beyond source/step/parents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default)]
    pub source: CheckpointSource,
    /// -1 for the input checkpoint, then 0, 1, ...
    #[serde(default)]
    pub step: i64,
    /// Namespace to parent checkpoint id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parents: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, step: i64) -> Self {
        Self {
            source,
            step,
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// JSON form with NUL bytes removed from every key and string.
    pub fn to_sanitized_value(&self) -> Result<Value, CheckpointError> {
        serde_json::to_value(self)
            .map(strip_nul)
            .map_err(|e| CheckpointError::Serialization(format!("checkpoint metadata: {}", e)))
    }

    /// Parses stored metadata. Unknown fields land in `extra`; a malformed known field
    /// is an error.
    pub fn from_value(value: Value) -> Result<Self, CheckpointError> {
        serde_json::from_value(value)
            .map_err(|e| CheckpointError::Serialization(format!("checkpoint metadata: {}", e)))
    }
}

/// Removes `\0` from all strings and object keys, recursively.
pub fn strip_nul(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', "")),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('\0', ""), strip_nul(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Subset match: every key of `filter` is present in `metadata` with an equal value.
pub fn metadata_matches(metadata: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(k, expected)| metadata.get(k) == Some(expected))
}

/// One uncommitted write by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub task_id: String,
    pub channel: String,
    pub value: Value,
}

/// A checkpoint with everything needed to resume from it.
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Points at this checkpoint.
    pub config: RunnableConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    pub parent_config: Option<RunnableConfig>,
    /// Sorted by (task_id, index).
    pub pending_writes: Vec<PendingWrite>,
}

/// Options for `Checkpointer::list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Subset match against metadata.
    pub filter: Option<Map<String, Value>>,
    /// Only checkpoints with an id strictly lower than this.
    pub before: Option<String>,
    /// Defaults to [`DEFAULT_LIST_LIMIT`].
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn before(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.before = Some(checkpoint_id.into());
        self
    }

    pub fn filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }

    /// Row-level check shared by backends.
    pub fn accepts(&self, checkpoint_id: &str, metadata: &Value) -> bool {
        if let Some(before) = &self.before {
            if checkpoint_id >= before.as_str() {
                return false;
            }
        }
        match &self.filter {
            Some(f) => metadata_matches(metadata, f),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: reserved channels map to fixed negative indices; others do not.
    #[test]
    fn writes_idx_map_reserved_only() {
        assert_eq!(writes_idx_map(ERROR), Some(-1));
        assert_eq!(writes_idx_map(SCHEDULED), Some(-2));
        assert_eq!(writes_idx_map(INTERRUPT), Some(-3));
        assert_eq!(writes_idx_map(RESUME), Some(-4));
        assert_eq!(writes_idx_map("messages"), None);
        assert_eq!(writes_idx_map(TASKS), None);
    }

    /// **Scenario**: version tokens compare like their counters.
    #[test]
    fn version_tokens_sort_numerically() {
        assert!(version_token(9) < version_token(10));
        assert_eq!(parse_version(&version_token(42)), 42);
    }

    /// **Scenario**: NUL bytes vanish from nested strings and keys.
    #[test]
    fn strip_nul_recurses() {
        let v = json!({"a\u{0}b": ["x\u{0}", {"c": "d\u{0}e"}], "n": 1});
        assert_eq!(strip_nul(v), json!({"ab": ["x", {"c": "de"}], "n": 1}));
    }

    /// **Scenario**: metadata extra fields flatten next to source/step and parse back.
    #[test]
    fn metadata_flattens_extra() {
        let m = CheckpointMetadata::new(CheckpointSource::Input, -1)
            .with_extra("user\u{0}", json!("u\u{0}1"));
        let v = m.to_sanitized_value().unwrap();
        assert_eq!(v["source"], "input");
        assert_eq!(v["step"], -1);
        assert_eq!(v["user"], "u1");
        let back = CheckpointMetadata::from_value(v).unwrap();
        assert_eq!(back.step, -1);
        assert_eq!(back.extra.get("user"), Some(&json!("u1")));
    }

    /// **Scenario**: stored metadata with a malformed step or source is reported, not
    /// replaced by defaults.
    #[test]
    fn corrupt_metadata_is_an_error() {
        for bad in [
            json!({"source": "loop", "step": "three"}),
            json!({"source": "sideways", "step": 1}),
            json!(["not", "an", "object"]),
        ] {
            assert!(matches!(
                CheckpointMetadata::from_value(bad),
                Err(CheckpointError::Serialization(_))
            ));
        }
    }

    /// **Scenario**: filter is a subset match, not whole-object equality.
    #[test]
    fn metadata_filter_is_subset() {
        let meta = json!({"source": "loop", "step": 3, "tag": "x"});
        let mut f = Map::new();
        f.insert("source".into(), json!("loop"));
        assert!(metadata_matches(&meta, &f));
        f.insert("step".into(), json!(4));
        assert!(!metadata_matches(&meta, &f));
    }

    /// **Scenario**: before is an exclusive upper bound.
    #[test]
    fn list_options_before_is_exclusive() {
        let o = ListOptions::default().before("b");
        assert!(o.accepts("a", &json!({})));
        assert!(!o.accepts("b", &json!({})));
        assert_eq!(o.effective_limit(), DEFAULT_LIST_LIMIT);
    }
}
