//! In-memory checkpointer (MemorySaver). Not persistent; for dev and tests.
//!
//! Keeps the same three tables a durable backend has (checkpoints, blobs, writes)
//! so the put/put_writes/get semantics are identical to `SqliteSaver`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::memory::checkpoint::{
    writes_idx_map, ChannelVersions, Checkpoint, CheckpointMetadata, CheckpointTuple, ListOptions,
    PendingWrite, TASKS,
};
use crate::memory::checkpointer::{
    checkpoint_id_required, thread_id_required, CheckpointError, CheckpointStream, Checkpointer,
};
use crate::memory::config::RunnableConfig;
use crate::memory::serializer::{JsonSerializer, TypedData, TypedSerializer};

/// (thread_id, checkpoint_ns)
type ThreadKey = (String, String);

struct CheckpointRow {
    checkpoint: Checkpoint,
    metadata: Value,
    parent_id: Option<String>,
}

struct WriteRow {
    channel: String,
    data: TypedData,
}

#[derive(Default)]
struct Tables {
    /// Per thread: checkpoint id -> row. BTreeMap keeps ids sorted.
    checkpoints: HashMap<ThreadKey, BTreeMap<String, CheckpointRow>>,
    /// (thread, ns, channel, version) -> blob.
    blobs: HashMap<(String, String, String, String), TypedData>,
    /// Per thread: (checkpoint_id, task_id, idx) -> write.
    writes: HashMap<ThreadKey, BTreeMap<(String, String, i64), WriteRow>>,
}

/// In-memory checkpointer. Clones share the same tables.
///
/// **Interaction**: Used as `Arc<dyn Checkpointer>` in `StateGraph::compile_with_checkpointer`.
#[derive(Clone)]
pub struct MemorySaver {
    tables: Arc<RwLock<Tables>>,
    serializer: Arc<dyn TypedSerializer>,
    writable: bool,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            serializer: Arc::new(JsonSerializer),
            writable: true,
        }
    }

    /// Handle over the same tables on which `put` and `put_writes` fail with `ReadOnly`.
    pub fn read_only(&self) -> Self {
        Self {
            writable: false,
            ..self.clone()
        }
    }

    fn ensure_writable(&self) -> Result<(), CheckpointError> {
        if self.writable {
            Ok(())
        } else {
            Err(CheckpointError::ReadOnly)
        }
    }

    fn key(config: &RunnableConfig) -> Result<ThreadKey, CheckpointError> {
        Ok((thread_id_required(config)?, config.checkpoint_ns.clone()))
    }

    fn hydrate(
        &self,
        tables: &Tables,
        key: &ThreadKey,
        checkpoint_id: &str,
        row: &CheckpointRow,
    ) -> Result<CheckpointTuple, CheckpointError> {
        let mut checkpoint = row.checkpoint.clone();
        for (channel, version) in &row.checkpoint.channel_versions {
            let blob_key = (key.0.clone(), key.1.clone(), channel.clone(), version.clone());
            if let Some(blob) = tables.blobs.get(&blob_key) {
                if let Some(value) = self.serializer.loads_typed(blob)? {
                    checkpoint.channel_values.insert(channel.clone(), value);
                }
            }
        }

        let mut pending_writes = Vec::new();
        let mut pending_sends = Vec::new();
        if let Some(writes) = tables.writes.get(key) {
            for ((cp, task_id, _), w) in writes.iter() {
                if cp == checkpoint_id {
                    pending_writes.push(PendingWrite {
                        task_id: task_id.clone(),
                        channel: w.channel.clone(),
                        value: self.serializer.loads_typed(&w.data)?.unwrap_or(Value::Null),
                    });
                }
            }
            if let Some(parent) = &row.parent_id {
                let mut sends: Vec<(i64, &WriteRow)> = writes
                    .iter()
                    .filter(|((cp, _, _), w)| cp == parent && w.channel == TASKS)
                    .map(|((_, _, idx), w)| (*idx, w))
                    .collect();
                sends.sort_by_key(|(idx, _)| *idx);
                for (_, w) in sends {
                    if let Some(v) = self.serializer.loads_typed(&w.data)? {
                        pending_sends.push(v);
                    }
                }
            }
        }
        checkpoint.pending_sends = pending_sends;

        let config = RunnableConfig {
            thread_id: Some(key.0.clone()),
            checkpoint_ns: key.1.clone(),
            checkpoint_id: Some(checkpoint_id.to_string()),
        };
        let parent_config = row
            .parent_id
            .as_ref()
            .map(|p| config.clone().with_checkpoint_id(p.clone()));
        Ok(CheckpointTuple {
            config,
            checkpoint,
            metadata: CheckpointMetadata::from_value(row.metadata.clone())?,
            parent_config,
            pending_writes,
        })
    }
}

impl Default for MemorySaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn get_tuple(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<CheckpointTuple>, CheckpointError> {
        let key = Self::key(config)?;
        let tables = self.tables.read().await;
        let Some(rows) = tables.checkpoints.get(&key) else {
            return Ok(None);
        };
        let found = match &config.checkpoint_id {
            Some(id) => rows.get_key_value(id.as_str()),
            None => rows.iter().next_back(),
        };
        match found {
            Some((id, row)) => self.hydrate(&tables, &key, id, row).map(Some),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        config: &RunnableConfig,
        checkpoint: &Checkpoint,
        metadata: &CheckpointMetadata,
        new_versions: &ChannelVersions,
    ) -> Result<RunnableConfig, CheckpointError> {
        self.ensure_writable()?;
        let key = Self::key(config)?;

        let mut blobs = Vec::with_capacity(new_versions.len());
        for (channel, version) in new_versions {
            let data = match checkpoint.channel_values.get(channel) {
                Some(v) => self.serializer.dumps_typed(v)?,
                None => TypedData::empty(),
            };
            blobs.push((channel.clone(), version.clone(), data));
        }
        let metadata = metadata.to_sanitized_value()?;

        let mut tables = self.tables.write().await;
        for (channel, version, data) in blobs {
            tables
                .blobs
                .entry((key.0.clone(), key.1.clone(), channel, version))
                .or_insert(data);
        }
        let rows = tables.checkpoints.entry(key.clone()).or_default();
        match rows.get_mut(&checkpoint.id) {
            Some(existing) => {
                existing.checkpoint = checkpoint.without_values();
                existing.metadata = metadata;
            }
            None => {
                rows.insert(
                    checkpoint.id.clone(),
                    CheckpointRow {
                        checkpoint: checkpoint.without_values(),
                        metadata,
                        parent_id: config.checkpoint_id.clone(),
                    },
                );
            }
        }

        Ok(RunnableConfig {
            thread_id: Some(key.0),
            checkpoint_ns: key.1,
            checkpoint_id: Some(checkpoint.id.clone()),
        })
    }

    async fn put_writes(
        &self,
        config: &RunnableConfig,
        writes: &[(String, Value)],
        task_id: &str,
    ) -> Result<(), CheckpointError> {
        self.ensure_writable()?;
        let key = Self::key(config)?;
        let checkpoint_id = checkpoint_id_required(config)?;

        let mut rows = Vec::with_capacity(writes.len());
        for (idx, (channel, value)) in writes.iter().enumerate() {
            let data = self.serializer.dumps_typed(value)?;
            rows.push((channel.clone(), idx as i64, data));
        }

        let mut tables = self.tables.write().await;
        let table = tables.writes.entry(key).or_default();
        for (channel, idx, data) in rows {
            let reserved_idx = writes_idx_map(&channel);
            let row_key = (
                checkpoint_id.clone(),
                task_id.to_string(),
                reserved_idx.unwrap_or(idx),
            );
            let row = WriteRow { channel, data };
            if reserved_idx.is_some() {
                table.insert(row_key, row);
            } else {
                table.entry(row_key).or_insert(row);
            }
        }
        Ok(())
    }

    async fn list<'a>(
        &'a self,
        config: &RunnableConfig,
        options: ListOptions,
    ) -> Result<CheckpointStream<'a>, CheckpointError> {
        let key = Self::key(config)?;
        let ids: Vec<String> = {
            let tables = self.tables.read().await;
            match tables.checkpoints.get(&key) {
                Some(rows) => rows
                    .iter()
                    .rev()
                    .filter(|(id, _)| {
                        config.checkpoint_id.as_deref().map_or(true, |want| want == id.as_str())
                    })
                    .filter(|(id, row)| options.accepts(id, &row.metadata))
                    .take(options.effective_limit())
                    .map(|(id, _)| id.clone())
                    .collect(),
                None => Vec::new(),
            }
        };
        let base = config.latest();
        let stream = futures::stream::iter(ids)
            .then(move |id| {
                let cfg = base.clone().with_checkpoint_id(id);
                async move { self.get_tuple(&cfg).await }
            })
            .filter_map(|r| async move { r.transpose() });
        Ok(stream.boxed())
    }
}
