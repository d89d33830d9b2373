//! Streaming types for graph runs.
//!
//! `CompiledStateGraph::stream` runs the graph on a spawned task and pushes
//! [`StreamEvent`]s through a bounded channel; the consumer pulls them as a
//! `ReceiverStream`. Dropping the stream stops the run at the next superstep boundary
//! after the current checkpoint is committed.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::graph::Interrupt;
use crate::memory::RunnableConfig;

/// Capacity of the engine -> consumer channel.
pub const STREAM_BUFFER: usize = 128;

/// Which kinds of events to emit. `Interrupt` and `Error` events are always emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Full public state after each committed superstep.
    Values,
    /// Each node's update as it completes.
    Updates,
    /// Task scheduling.
    Tasks,
    /// Each committed checkpoint.
    Checkpoints,
}

impl StreamMode {
    pub fn all() -> HashSet<StreamMode> {
        [Self::Values, Self::Updates, Self::Tasks, Self::Checkpoints]
            .into_iter()
            .collect()
    }
}

/// One event of a streamed run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A node was scheduled in superstep `step`.
    TaskStart {
        node: String,
        task_id: String,
        step: i64,
    },
    /// A node finished; events follow completion order.
    Updates {
        node: String,
        update: Value,
        step: i64,
    },
    Values { state: Value, step: i64 },
    Checkpoint { config: RunnableConfig, step: i64 },
    Interrupt(Interrupt),
    /// Terminal failure. `node` is absent for run-level errors (routing, persistence).
    Error {
        node: Option<String>,
        message: String,
    },
}

impl StreamEvent {
    /// Mode this event belongs to; `None` for events that are always sent.
    pub fn mode(&self) -> Option<StreamMode> {
        match self {
            Self::TaskStart { .. } => Some(StreamMode::Tasks),
            Self::Updates { .. } => Some(StreamMode::Updates),
            Self::Values { .. } => Some(StreamMode::Values),
            Self::Checkpoint { .. } => Some(StreamMode::Checkpoints),
            Self::Interrupt(_) | Self::Error { .. } => None,
        }
    }
}

/// Engine side of a stream: filters by mode and notices a dropped receiver.
pub(crate) struct Emitter {
    tx: Option<mpsc::Sender<StreamEvent>>,
    modes: HashSet<StreamMode>,
    closed: bool,
}

impl Emitter {
    /// Emitter for `invoke`: drops everything.
    pub(crate) fn silent() -> Self {
        Self {
            tx: None,
            modes: HashSet::new(),
            closed: false,
        }
    }

    pub(crate) fn new(tx: mpsc::Sender<StreamEvent>, modes: HashSet<StreamMode>) -> Self {
        Self {
            tx: Some(tx),
            modes,
            closed: false,
        }
    }

    pub(crate) async fn emit(&mut self, event: StreamEvent) {
        if self.closed {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        if let Some(mode) = event.mode() {
            if !self.modes.contains(&mode) {
                return;
            }
        }
        if tx.send(event).await.is_err() {
            tracing::debug!("stream receiver dropped");
            self.closed = true;
        }
    }

    /// True once the consumer went away.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed || self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}
