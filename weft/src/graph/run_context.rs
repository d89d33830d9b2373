//! Per-task context handed to nodes.

use serde_json::Value;

use crate::memory::RunnableConfig;

/// What a node knows about the task it is running as.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Thread and checkpoint the superstep started from.
    pub config: RunnableConfig,
    /// Superstep number (0-based).
    pub step: i64,
    pub task_id: String,
    /// Set when this task suspended earlier and the run is being resumed.
    pub resume: Option<Value>,
    /// Payload this task suspended with; set together with `resume`.
    pub interrupt: Option<Value>,
}

impl RunContext {
    pub fn new(config: RunnableConfig, step: i64, task_id: impl Into<String>) -> Self {
        Self {
            config,
            step,
            task_id: task_id.into(),
            resume: None,
            interrupt: None,
        }
    }

    pub fn with_resume(mut self, value: Value) -> Self {
        self.resume = Some(value);
        self
    }

    pub fn with_interrupt(mut self, payload: Value) -> Self {
        self.interrupt = Some(payload);
        self
    }

    /// The resume value, if any.
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref()
    }

    /// What the task asked when it suspended, if it is being resumed.
    pub fn interrupt_value(&self) -> Option<&Value> {
        self.interrupt.as_ref()
    }
}
