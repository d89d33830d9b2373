//! One contract, two backends: every scenario runs against MemorySaver and SqliteSaver.

mod init_logging;

use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use weft::memory::{
    version_token, ChannelVersions, Checkpoint, CheckpointMetadata, CheckpointSource,
    CheckpointTuple, ListOptions,
};
use weft::{CheckpointError, Checkpointer, MemorySaver, RunnableConfig, SqliteSaver};

fn backends() -> Vec<(&'static str, Arc<dyn Checkpointer>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteSaver::new(dir.path().join("checkpoints.db")).unwrap();
    vec![
        ("memory", Arc::new(MemorySaver::new()), None),
        ("sqlite", Arc::new(sqlite), Some(dir)),
    ]
}

fn checkpoint(values: &[(&str, Value)], version: u64) -> (Checkpoint, ChannelVersions) {
    let mut cp = Checkpoint::new();
    let mut versions = ChannelVersions::new();
    for (name, v) in values {
        cp.channel_values.insert(name.to_string(), v.clone());
        cp.channel_versions.insert(name.to_string(), version_token(version));
        versions.insert(name.to_string(), version_token(version));
    }
    (cp, versions)
}

async fn list_all(saver: &dyn Checkpointer, config: &RunnableConfig, options: ListOptions) -> Vec<CheckpointTuple> {
    saver
        .list(config, options)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

/// **Scenario**: nested objects, arrays and primitives come back deep-equal.
#[tokio::test]
async fn round_trip_nested_values() {
    for (name, saver, _dir) in backends() {
        let config = RunnableConfig::for_thread("round-trip");
        let (cp, versions) = checkpoint(
            &[
                ("messages", json!([{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello", "step": "Response"}])),
                ("plan", json!([{"description": "find X", "substeps": ["search", "read"]}])),
                ("flags", json!({"projectId": "p1", "webSearch": true, "excludedDocuments": []})),
                ("count", json!(7)),
                ("ratio", json!(0.5)),
                ("done", json!(false)),
            ],
            1,
        );
        saver
            .put(&config, &cp, &CheckpointMetadata::new(CheckpointSource::Input, -1), &versions)
            .await
            .unwrap();
        let tuple = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.channel_values, cp.channel_values, "{}", name);
        assert_eq!(tuple.metadata.source, CheckpointSource::Input, "{}", name);
        assert_eq!(tuple.metadata.step, -1, "{}", name);
    }
}

/// **Scenario**: writing the same (thread, ns, channel, version) twice neither fails nor
/// replaces the stored blob.
#[tokio::test]
async fn idempotent_blob_writes() {
    for (name, saver, _dir) in backends() {
        let config = RunnableConfig::for_thread("blobs");
        let (first, versions) = checkpoint(&[("last_node", json!("planner"))], 3);
        let c1 = saver
            .put(&config, &first, &CheckpointMetadata::default(), &versions)
            .await
            .unwrap();
        let (mut second, _) = checkpoint(&[("last_node", json!("replan"))], 3);
        second.channel_versions = first.channel_versions.clone();
        saver
            .put(&c1, &second, &CheckpointMetadata::default(), &versions)
            .await
            .unwrap();
        let tuple = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.id, second.id, "{}", name);
        assert_eq!(tuple.checkpoint.channel_values["last_node"], json!("planner"), "{}", name);
    }
}

/// **Scenario**: a chain of N puts lists as N tuples, newest first, each pointing at
/// the one before it.
#[tokio::test]
async fn monotonic_history() {
    const N: usize = 5;
    for (name, saver, _dir) in backends() {
        let mut config = RunnableConfig::for_thread("history");
        let mut ids = Vec::new();
        for step in 0..N {
            let (cp, versions) = checkpoint(&[("step", json!(step))], step as u64 + 1);
            ids.push(cp.id.clone());
            config = saver
                .put(&config, &cp, &CheckpointMetadata::new(CheckpointSource::Loop, step as i64), &versions)
                .await
                .unwrap();
        }

        let tuples = list_all(saver.as_ref(), &RunnableConfig::for_thread("history"), ListOptions::default()).await;
        assert_eq!(tuples.len(), N, "{}", name);
        let listed: Vec<String> = tuples.iter().map(|t| t.checkpoint.id.clone()).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(listed, expected, "{}", name);
        for pair in tuples.windows(2) {
            let parent = pair[0].parent_config.as_ref().unwrap();
            assert_eq!(parent.checkpoint_id, pair[1].config.checkpoint_id, "{}", name);
        }
        assert!(tuples[N - 1].parent_config.is_none(), "{}", name);

        let limited = list_all(
            saver.as_ref(),
            &RunnableConfig::for_thread("history"),
            ListOptions::default().before(ids[3].clone()).limit(2),
        )
        .await;
        let limited: Vec<String> = limited.into_iter().map(|t| t.checkpoint.id).collect();
        assert_eq!(limited, vec![ids[2].clone(), ids[1].clone()], "{}", name);
    }
}

/// **Scenario**: metadata filters match subsets; an exact checkpoint id restricts the list.
#[tokio::test]
async fn list_filters() {
    for (name, saver, _dir) in backends() {
        let mut config = RunnableConfig::for_thread("filters");
        for (i, source) in [CheckpointSource::Input, CheckpointSource::Loop, CheckpointSource::Loop]
            .into_iter()
            .enumerate()
        {
            let (cp, v) = checkpoint(&[], 1);
            let meta = CheckpointMetadata::new(source, i as i64).with_extra("user", json!("ann"));
            config = saver.put(&config, &cp, &meta, &v).await.unwrap();
        }
        let mut filter = Map::new();
        filter.insert("source".into(), json!("loop"));
        let loops = list_all(saver.as_ref(), &RunnableConfig::for_thread("filters"), ListOptions::default().filter(filter)).await;
        assert_eq!(loops.len(), 2, "{}", name);

        let exact = list_all(saver.as_ref(), &config, ListOptions::default()).await;
        assert_eq!(exact.len(), 1, "{}", name);
        assert_eq!(exact[0].config.checkpoint_id, config.checkpoint_id, "{}", name);
    }
}

/// **Scenario**: pending writes are read back ordered by task id then write index.
#[tokio::test]
async fn pending_write_order() {
    for (name, saver, _dir) in backends() {
        let (cp, v) = checkpoint(&[], 1);
        let c = saver
            .put(&RunnableConfig::for_thread("writes"), &cp, &CheckpointMetadata::default(), &v)
            .await
            .unwrap();
        saver
            .put_writes(&c, &[("messages".into(), json!(["b0"])), ("plan".into(), json!([]))], "task-b")
            .await
            .unwrap();
        saver
            .put_writes(&c, &[("messages".into(), json!(["a0"]))], "task-a")
            .await
            .unwrap();
        let tuple = saver.get_tuple(&c).await.unwrap().unwrap();
        let order: Vec<String> = tuple
            .pending_writes
            .iter()
            .map(|w| format!("{}/{}", w.task_id, w.channel))
            .collect();
        assert_eq!(order, vec!["task-a/messages", "task-b/messages", "task-b/plan"], "{}", name);
    }
}

/// **Scenario**: writes need a thread id and a writable handle.
#[tokio::test]
async fn write_preconditions() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteSaver::new(dir.path().join("ro.db")).unwrap();
    let memory = MemorySaver::new();
    let read_only: Vec<Arc<dyn Checkpointer>> = vec![Arc::new(memory.read_only()), Arc::new(sqlite.read_only())];
    for saver in read_only {
        let (cp, v) = checkpoint(&[("a", json!(1))], 1);
        let err = saver
            .put(&RunnableConfig::for_thread("t"), &cp, &CheckpointMetadata::default(), &v)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::ReadOnly));
    }
    for (name, saver, _dir) in backends() {
        let (cp, v) = checkpoint(&[], 1);
        let err = saver
            .put(&RunnableConfig::default(), &cp, &CheckpointMetadata::default(), &v)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::ThreadIdRequired), "{}", name);
        let err = saver
            .put_writes(&RunnableConfig::for_thread("t"), &[("a".into(), json!(1))], "task")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::CheckpointIdRequired), "{}", name);
    }
}
