//! Supervised chat graph: worker dispatch and asking the user mid-run.

mod init_logging;

use std::sync::Arc;

use serde_json::{json, Value};
use weft::llm::LlmResponse;
use weft::{
    build_chat_graph, chat_input, AgentMode, ChatDeps, ChatFlags, MemorySaver, Message, MockLlm,
    MockToolSource, Retriever, RunnableConfig, ToolCall, ToolSource, Toolkit, END,
};

fn messages(state: &Value) -> Vec<Message> {
    serde_json::from_value(state["messages"].clone()).unwrap()
}

/// **Scenario**: the supervisor asks the user, the run suspends with the question, and
/// resuming appends the reply and hands control back to the supervisor.
#[tokio::test]
async fn ask_user_suspends_and_resumes() {
    let llm = Arc::new(MockLlm::default().with_structured(
        "route",
        vec![
            json!({"next": "ask_user", "instruction": "Which directory?"}),
            json!({"next": "__end__"}),
        ],
    ));
    let deps = ChatDeps::new(llm, Arc::new(Retriever::default()), Toolkit::default());
    let graph = build_chat_graph(&deps, AgentMode::Supervised, Some(Arc::new(MemorySaver::new()))).unwrap();
    let config = RunnableConfig::for_thread("hitl");

    let out = graph
        .invoke(chat_input(Message::user("clean up my files"), &ChatFlags::default()), &config)
        .await
        .unwrap();
    assert!(out.is_suspended());
    let interrupt = out.interrupt().unwrap();
    assert_eq!(interrupt.node, "ask_user");
    assert_eq!(interrupt.value, json!("Which directory?"));

    let snapshot = graph.get_state(&config).await.unwrap().unwrap();
    assert_eq!(snapshot.next, vec!["ask_user".to_string()]);

    let out = graph.resume(json!("ok"), &config).await.unwrap();
    assert!(!out.is_suspended());
    let state = out.state().to_value();
    let msgs = messages(&state);
    let last = msgs.last().unwrap();
    assert!(last.is_user());
    assert_eq!(last.content(), "ok");
    assert_eq!(state["last_node"], json!("supervisor"));
    assert_eq!(state["next"], json!(END));
}

/// **Scenario**: the supervisor dispatches to the shell worker, which calls its tool and
/// reports back; "FINISH" ends the run.
#[tokio::test]
async fn dispatches_to_shell_worker() {
    let shell = Arc::new(MockToolSource::new().with_text_tool("shell_ls", "a.txt\nb.txt"));
    let toolkit = Toolkit::load(vec![("shell".to_string(), shell.clone() as Arc<dyn ToolSource>)], false)
        .await
        .unwrap();
    let llm = Arc::new(
        MockLlm::with_responses(vec![
            LlmResponse::with_tool_calls("", vec![ToolCall::new("c1", "shell_ls", json!({}))]),
            LlmResponse::text("Two files: a.txt and b.txt"),
        ])
        .with_structured(
            "route",
            vec![
                json!({"next": "shell_worker", "instruction": "list the files"}),
                json!({"next": "FINISH"}),
            ],
        ),
    );
    let deps = ChatDeps::new(llm, Arc::new(Retriever::default()), toolkit);
    let graph = build_chat_graph(&deps, AgentMode::Supervised, None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("what's here?"), &ChatFlags::default()), &RunnableConfig::default())
        .await
        .unwrap();
    let state = out.state().to_value();
    let msgs = messages(&state);
    assert_eq!(msgs.last().unwrap().content(), "Two files: a.txt and b.txt");
    assert_eq!(state["last_node"], json!("supervisor"));
    assert_eq!(state["next"], json!(END));

    let calls = shell.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "shell_ls");
}
