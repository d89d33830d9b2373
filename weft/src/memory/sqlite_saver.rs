//! SQLite-backed checkpointer (SqliteSaver). Persistent across process restarts.
//!
//! Three tables mirror the checkpoint contract:
//! - `checkpoints`: one row per (thread, ns, checkpoint id) with parent id, JSON snapshot
//!   (without channel values) and sanitized metadata
//! - `checkpoint_blobs`: one typed blob per (thread, ns, channel, version)
//! - `checkpoint_writes`: pending writes per (thread, ns, checkpoint id, task id, idx)
//!
//! Every call opens its own connection on a blocking thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;

use crate::memory::checkpoint::{
    writes_idx_map, ChannelVersions, Checkpoint, CheckpointMetadata, CheckpointTuple, ListOptions,
    PendingWrite, TASKS,
};
use crate::memory::checkpointer::{
    checkpoint_id_required, thread_id_required, CheckpointError, CheckpointStream, Checkpointer,
};
use crate::memory::config::RunnableConfig;
use crate::memory::serializer::{JsonSerializer, TypedData, TypedSerializer};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    checkpoint_id TEXT NOT NULL,
    parent_checkpoint_id TEXT,
    checkpoint TEXT NOT NULL,
    metadata TEXT NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
);
CREATE TABLE IF NOT EXISTS checkpoint_blobs (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    channel TEXT NOT NULL,
    version TEXT NOT NULL,
    type TEXT NOT NULL,
    blob BLOB,
    PRIMARY KEY (thread_id, checkpoint_ns, channel, version)
);
CREATE TABLE IF NOT EXISTS checkpoint_writes (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    checkpoint_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    idx INTEGER NOT NULL,
    channel TEXT NOT NULL,
    type TEXT NOT NULL,
    blob BLOB NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id, task_id, idx)
);
"#;

fn storage(e: rusqlite::Error) -> CheckpointError {
    CheckpointError::Storage(e.to_string())
}

fn serialization(e: serde_json::Error) -> CheckpointError {
    CheckpointError::Serialization(e.to_string())
}

/// SQLite-backed checkpointer. Key: (thread_id, checkpoint_ns, checkpoint_id).
///
/// **Interaction**: Used as `Arc<dyn Checkpointer>` in `StateGraph::compile_with_checkpointer`;
/// `WeftConfig::open_checkpointer` picks it when `WEFT_DB_PATH` is set.
#[derive(Clone)]
pub struct SqliteSaver {
    db_path: PathBuf,
    serializer: Arc<dyn TypedSerializer>,
    writable: bool,
}

impl SqliteSaver {
    /// Opens (or creates) the database file and ensures the tables exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            db_path,
            serializer: Arc::new(JsonSerializer),
            writable: true,
        })
    }

    /// Read-only handle on an existing database; `put` and `put_writes` fail with `ReadOnly`.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(storage)?;
        Ok(Self {
            db_path,
            serializer: Arc::new(JsonSerializer),
            writable: false,
        })
    }

    /// Read-only handle on the same file.
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

    /// Runs `f` on a fresh connection in `spawn_blocking`.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &dyn TypedSerializer) -> Result<T, CheckpointError>
            + Send
            + 'static,
    {
        let db_path = self.db_path.clone();
        let writable = self.writable;
        let serializer = Arc::clone(&self.serializer);
        tokio::task::spawn_blocking(move || {
            let flags = if writable {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            } else {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            };
            let mut conn = Connection::open_with_flags(&db_path, flags).map_err(storage)?;
            f(&mut conn, serializer.as_ref())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}

fn load_tuple(
    conn: &Connection,
    serializer: &dyn TypedSerializer,
    thread_id: &str,
    checkpoint_ns: &str,
    checkpoint_id: Option<&str>,
) -> Result<Option<CheckpointTuple>, CheckpointError> {
    type Row = (String, Option<String>, String, String);
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<Row> {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    };
    let row: Option<Row> = match checkpoint_id {
        Some(id) => conn
            .query_row(
                "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata FROM checkpoints
                 WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3",
                params![thread_id, checkpoint_ns, id],
                map_row,
            )
            .optional(),
        None => conn
            .query_row(
                "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata FROM checkpoints
                 WHERE thread_id = ?1 AND checkpoint_ns = ?2
                 ORDER BY checkpoint_id DESC LIMIT 1",
                params![thread_id, checkpoint_ns],
                map_row,
            )
            .optional(),
    }
    .map_err(storage)?;
    let Some((id, parent_id, checkpoint_json, metadata_json)) = row else {
        return Ok(None);
    };

    let mut checkpoint: Checkpoint = serde_json::from_str(&checkpoint_json).map_err(serialization)?;
    let metadata: Value = serde_json::from_str(&metadata_json).map_err(serialization)?;

    let mut blob_stmt = conn
        .prepare(
            "SELECT type, blob FROM checkpoint_blobs
             WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND channel = ?3 AND version = ?4",
        )
        .map_err(storage)?;
    let versions = checkpoint.channel_versions.clone();
    for (channel, version) in &versions {
        let blob: Option<(String, Option<Vec<u8>>)> = blob_stmt
            .query_row(params![thread_id, checkpoint_ns, channel, version], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .optional()
            .map_err(storage)?;
        if let Some((type_tag, data)) = blob {
            let typed = TypedData::new(type_tag, data.unwrap_or_default());
            if let Some(value) = serializer.loads_typed(&typed)? {
                checkpoint.channel_values.insert(channel.clone(), value);
            }
        }
    }

    let mut writes_stmt = conn
        .prepare(
            "SELECT task_id, channel, type, blob FROM checkpoint_writes
             WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3
             ORDER BY task_id, idx",
        )
        .map_err(storage)?;
    let rows = writes_stmt
        .query_map(params![thread_id, checkpoint_ns, id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Vec<u8>>(3)?,
            ))
        })
        .map_err(storage)?;
    let mut pending_writes = Vec::new();
    for row in rows {
        let (task_id, channel, type_tag, data) = row.map_err(storage)?;
        let value = serializer
            .loads_typed(&TypedData::new(type_tag, data))?
            .unwrap_or(Value::Null);
        pending_writes.push(PendingWrite {
            task_id,
            channel,
            value,
        });
    }

    let mut pending_sends = Vec::new();
    if let Some(parent) = &parent_id {
        let mut sends_stmt = conn
            .prepare(
                "SELECT type, blob FROM checkpoint_writes
                 WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3 AND channel = ?4
                 ORDER BY idx",
            )
            .map_err(storage)?;
        let rows = sends_stmt
            .query_map(params![thread_id, checkpoint_ns, parent, TASKS], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?))
            })
            .map_err(storage)?;
        for row in rows {
            let (type_tag, data) = row.map_err(storage)?;
            if let Some(v) = serializer.loads_typed(&TypedData::new(type_tag, data))? {
                pending_sends.push(v);
            }
        }
    }
    checkpoint.pending_sends = pending_sends;

    let config = RunnableConfig {
        thread_id: Some(thread_id.to_string()),
        checkpoint_ns: checkpoint_ns.to_string(),
        checkpoint_id: Some(id),
    };
    let parent_config = parent_id.map(|p| config.clone().with_checkpoint_id(p));
    Ok(Some(CheckpointTuple {
        config,
        checkpoint,
        metadata: CheckpointMetadata::from_value(metadata)?,
        parent_config,
        pending_writes,
    }))
}

#[async_trait]
impl Checkpointer for SqliteSaver {
    async fn get_tuple(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<CheckpointTuple>, CheckpointError> {
        let thread_id = thread_id_required(config)?;
        let checkpoint_ns = config.checkpoint_ns.clone();
        let checkpoint_id = config.checkpoint_id.clone();
        self.with_conn(move |conn, ser| {
            load_tuple(conn, ser, &thread_id, &checkpoint_ns, checkpoint_id.as_deref())
        })
        .await
    }

    async fn put(
        &self,
        config: &RunnableConfig,
        checkpoint: &Checkpoint,
        metadata: &CheckpointMetadata,
        new_versions: &ChannelVersions,
    ) -> Result<RunnableConfig, CheckpointError> {
        self.ensure_writable()?;
        let thread_id = thread_id_required(config)?;
        let checkpoint_ns = config.checkpoint_ns.clone();
        let parent_id = config.checkpoint_id.clone();

        let mut blobs = Vec::with_capacity(new_versions.len());
        for (channel, version) in new_versions {
            let data = match checkpoint.channel_values.get(channel) {
                Some(v) => self.serializer.dumps_typed(v)?,
                None => TypedData::empty(),
            };
            blobs.push((channel.clone(), version.clone(), data));
        }
        let checkpoint_json =
            serde_json::to_string(&checkpoint.without_values()).map_err(serialization)?;
        let metadata_json =
            serde_json::to_string(&metadata.to_sanitized_value()?).map_err(serialization)?;
        let checkpoint_id = checkpoint.id.clone();

        let next = RunnableConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_ns: checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint_id.clone()),
        };
        self.with_conn(move |conn, _| {
            let tx = conn.transaction().map_err(storage)?;
            {
                let mut blob_stmt = tx
                    .prepare(
                        "INSERT OR IGNORE INTO checkpoint_blobs
                         (thread_id, checkpoint_ns, channel, version, type, blob)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .map_err(storage)?;
                for (channel, version, data) in &blobs {
                    blob_stmt
                        .execute(params![
                            thread_id,
                            checkpoint_ns,
                            channel,
                            version,
                            data.type_tag,
                            data.data
                        ])
                        .map_err(storage)?;
                }
            }
            tx.execute(
                "INSERT INTO checkpoints
                 (thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id)
                 DO UPDATE SET checkpoint = excluded.checkpoint, metadata = excluded.metadata",
                params![
                    thread_id,
                    checkpoint_ns,
                    checkpoint_id,
                    parent_id,
                    checkpoint_json,
                    metadata_json
                ],
            )
            .map_err(storage)?;
            tx.commit().map_err(storage)
        })
        .await?;
        Ok(next)
    }

    async fn put_writes(
        &self,
        config: &RunnableConfig,
        writes: &[(String, Value)],
        task_id: &str,
    ) -> Result<(), CheckpointError> {
        self.ensure_writable()?;
        let thread_id = thread_id_required(config)?;
        let checkpoint_id = checkpoint_id_required(config)?;
        let checkpoint_ns = config.checkpoint_ns.clone();
        let task_id = task_id.to_string();

        let mut rows = Vec::with_capacity(writes.len());
        for (idx, (channel, value)) in writes.iter().enumerate() {
            let data = self.serializer.dumps_typed(value)?;
            let reserved = writes_idx_map(channel);
            rows.push((channel.clone(), reserved.unwrap_or(idx as i64), reserved.is_some(), data));
        }

        self.with_conn(move |conn, _| {
            let tx = conn.transaction().map_err(storage)?;
            for (channel, idx, overwrite, data) in &rows {
                let verb = if *overwrite {
                    "INSERT OR REPLACE"
                } else {
                    "INSERT OR IGNORE"
                };
                tx.execute(
                    &format!(
                        "{} INTO checkpoint_writes
                         (thread_id, checkpoint_ns, checkpoint_id, task_id, idx, channel, type, blob)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        verb
                    ),
                    params![
                        thread_id,
                        checkpoint_ns,
                        checkpoint_id,
                        task_id,
                        idx,
                        channel,
                        data.type_tag,
                        data.data
                    ],
                )
                .map_err(storage)?;
            }
            tx.commit().map_err(storage)
        })
        .await
    }

    async fn list<'a>(
        &'a self,
        config: &RunnableConfig,
        options: ListOptions,
    ) -> Result<CheckpointStream<'a>, CheckpointError> {
        let thread_id = thread_id_required(config)?;
        let checkpoint_ns = config.checkpoint_ns.clone();
        let only = config.checkpoint_id.clone();
        let ids: Vec<String> = self
            .with_conn(move |conn, _| {
                let mut stmt = conn
                    .prepare(
                        "SELECT checkpoint_id, metadata FROM checkpoints
                         WHERE thread_id = ?1 AND checkpoint_ns = ?2
                         AND (?3 IS NULL OR checkpoint_id = ?3)
                         ORDER BY checkpoint_id DESC",
                    )
                    .map_err(storage)?;
                let rows = stmt
                    .query_map(params![thread_id, checkpoint_ns, only], |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                    })
                    .map_err(storage)?;
                let mut ids = Vec::new();
                for row in rows {
                    if ids.len() >= options.effective_limit() {
                        break;
                    }
                    let (id, metadata) = row.map_err(storage)?;
                    let metadata: Value = serde_json::from_str(&metadata).map_err(serialization)?;
                    if options.accepts(&id, &metadata) {
                        ids.push(id);
                    }
                }
                Ok(ids)
            })
            .await?;

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
