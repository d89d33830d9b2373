//! Logging helpers for graph execution.

use crate::error::GraphError;

pub fn log_run_start(thread_id: Option<&str>, resuming: bool) {
    tracing::info!(thread_id = thread_id.unwrap_or("-"), resuming, "Starting graph run");
}

pub fn log_run_complete(thread_id: Option<&str>, steps: usize) {
    tracing::info!(thread_id = thread_id.unwrap_or("-"), steps, "Graph run complete");
}

/// Log the tasks scheduled for a superstep.
pub fn log_superstep(step: i64, nodes: &[String]) {
    tracing::debug!(step, ?nodes, "Superstep scheduled");
}

pub fn log_node_start(node_id: &str, task_id: &str) {
    tracing::debug!(node_id, task_id, "Starting node execution");
}

pub fn log_node_complete(node_id: &str, writes: usize) {
    tracing::debug!(node_id, writes, "Node execution complete");
}

/// Log a task whose writes are reused from the checkpoint instead of re-running it.
pub fn log_node_reused(node_id: &str, task_id: &str) {
    tracing::debug!(node_id, task_id, "Reusing pending writes");
}

pub fn log_interrupt(node_id: &str, task_id: &str) {
    tracing::info!(node_id, task_id, "Run suspended by node");
}

pub fn log_checkpoint(checkpoint_id: &str, step: i64) {
    tracing::debug!(checkpoint_id, step, "Checkpoint committed");
}

pub fn log_graph_error(error: &GraphError) {
    tracing::error!(?error, "Graph execution error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_functions() {
        log_run_start(Some("t"), false);
        log_superstep(0, &["a".to_string()]);
        log_node_start("a", "cp:a");
        log_node_complete("a", 1);
        log_node_reused("a", "cp:a");
        log_interrupt("a", "cp:a");
        log_checkpoint("cp", 0);
        log_graph_error(&GraphError::RecursionLimit(1));
        log_run_complete(None, 1);
    }
}
