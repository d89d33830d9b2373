//! Checkpoint persistence: types, the `Checkpointer` contract and two backends.
//!
//! - [`MemorySaver`]: in-process tables behind a tokio `RwLock`
//! - [`SqliteSaver`]: rusqlite, one connection per call on a blocking thread
//!
//! Both store channel values as typed blobs keyed by (thread, ns, channel, version),
//! pending writes keyed by (thread, ns, checkpoint, task, idx), and checkpoint rows that
//! link to their parent.

mod checkpoint;
mod checkpoint_id;
mod checkpointer;
mod config;
mod memory_saver;
mod serializer;
mod sqlite_saver;

pub use checkpoint::{
    metadata_matches, parse_version, strip_nul, version_token, writes_idx_map, ChannelVersions,
    Checkpoint, CheckpointMetadata, CheckpointSource, CheckpointTuple, ListOptions, PendingWrite,
    CHECKPOINT_VERSION, DEFAULT_LIST_LIMIT, ERROR, INTERRUPT, RESUME, SCHEDULED, TASKS,
};
pub use checkpoint_id::next_checkpoint_id;
pub use checkpointer::{CheckpointError, CheckpointStream, Checkpointer};
pub use config::RunnableConfig;
pub use memory_saver::MemorySaver;
pub use serializer::{
    JsonSerializer, TypedData, TypedSerializer, TYPE_BYTES, TYPE_EMPTY, TYPE_JSON, TYPE_NULL,
};
pub use sqlite_saver::SqliteSaver;
