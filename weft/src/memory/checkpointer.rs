//! Checkpointer trait and CheckpointError.
//!
//! The four operations `get_tuple`, `put`, `put_writes` and `list` are the whole
//! storage contract; any backend that implements them is interchangeable.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::memory::checkpoint::{
    ChannelVersions, Checkpoint, CheckpointMetadata, CheckpointTuple, ListOptions,
};
use crate::memory::config::RunnableConfig;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("thread_id required")]
    ThreadIdRequired,
    #[error("checkpoint_id required")]
    CheckpointIdRequired,
    /// Write attempted through a read-only handle.
    #[error("checkpointer is read-only")]
    ReadOnly,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub(crate) fn thread_id_required(config: &RunnableConfig) -> Result<String, CheckpointError> {
    config
        .thread_id
        .clone()
        .ok_or(CheckpointError::ThreadIdRequired)
}

pub(crate) fn checkpoint_id_required(config: &RunnableConfig) -> Result<String, CheckpointError> {
    config
        .checkpoint_id
        .clone()
        .ok_or(CheckpointError::CheckpointIdRequired)
}

/// Lazily hydrated checkpoints, newest first.
pub type CheckpointStream<'a> = BoxStream<'a, Result<CheckpointTuple, CheckpointError>>;

/// Durable, versioned log of graph snapshots keyed by (thread_id, checkpoint_ns, checkpoint_id).
///
/// **Interaction**: injected via `StateGraph::compile_with_checkpointer`; the engine calls
/// `put_writes` as each task finishes and `put` once per superstep.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// The checkpoint named by `config.checkpoint_id`, or the latest one of the thread and
    /// namespace. Channel values, pending writes and pending sends are hydrated.
    async fn get_tuple(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<CheckpointTuple>, CheckpointError>;

    /// Stores blobs for `new_versions` (skipping versions already stored), then inserts the
    /// checkpoint row with parent `config.checkpoint_id`, or patches checkpoint and metadata
    /// when the id already exists. Returns a config pointing at the stored checkpoint.
    async fn put(
        &self,
        config: &RunnableConfig,
        checkpoint: &Checkpoint,
        metadata: &CheckpointMetadata,
        new_versions: &ChannelVersions,
    ) -> Result<RunnableConfig, CheckpointError>;

    /// Records writes of `task_id` against `config.checkpoint_id`.
    async fn put_writes(
        &self,
        config: &RunnableConfig,
        writes: &[(String, Value)],
        task_id: &str,
    ) -> Result<(), CheckpointError>;

    /// Checkpoints of the thread and namespace in descending id order. A `checkpoint_id` in
    /// `config` restricts the listing to that checkpoint.
    async fn list<'a>(
        &'a self,
        config: &RunnableConfig,
        options: ListOptions,
    ) -> Result<CheckpointStream<'a>, CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each CheckpointError variant contains expected keywords.
    #[test]
    fn checkpoint_error_display_all_variants() {
        assert!(CheckpointError::ThreadIdRequired.to_string().contains("thread"));
        assert!(CheckpointError::CheckpointIdRequired.to_string().contains("checkpoint_id"));
        assert!(CheckpointError::ReadOnly.to_string().contains("read-only"));
        assert!(CheckpointError::Serialization("e".into()).to_string().contains("serialization"));
        assert!(CheckpointError::Storage("io".into()).to_string().contains("storage"));
        assert!(CheckpointError::NotFound("id".into()).to_string().contains("not found"));
    }

    #[test]
    fn required_fields() {
        let c = RunnableConfig::default();
        assert!(matches!(thread_id_required(&c), Err(CheckpointError::ThreadIdRequired)));
        let c = RunnableConfig::for_thread("t");
        assert_eq!(thread_id_required(&c).unwrap(), "t");
        assert!(matches!(checkpoint_id_required(&c), Err(CheckpointError::CheckpointIdRequired)));
    }
}
