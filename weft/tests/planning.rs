//! Smart mode through the full chat graph: plan, execute, replan until a response.

mod init_logging;

use std::sync::Arc;

use serde_json::{json, Value};
use weft::llm::LlmResponse;
use weft::{
    build_chat_graph, chat_input, AgentMode, ChatDeps, ChatFlags, MemorySaver, Message, MockLlm,
    MockToolSource, PastStep, Retriever, RunnableConfig, ToolCall, ToolSource, Toolkit,
};

fn smart_flags() -> ChatFlags {
    ChatFlags {
        planner_mode: true,
        ..ChatFlags::default()
    }
}

fn messages(state: &Value) -> Vec<Message> {
    serde_json::from_value(state["messages"].clone()).unwrap()
}

fn past_steps(state: &Value) -> Vec<PastStep> {
    serde_json::from_value(state["past_steps"].clone()).unwrap()
}

/// **Scenario**: a two-step plan, revised once, runs each step exactly once and ends
/// with the tagged response.
#[tokio::test]
async fn plan_execute_replan_to_response() {
    let llm = Arc::new(
        MockLlm::with_responses(vec![LlmResponse::text("found X"), LlmResponse::text("summary of X")])
            .with_structured(
                "plan",
                vec![json!({"steps": [{"description": "find X"}, {"description": "summarize X"}]})],
            )
            .with_structured(
                "replan",
                vec![
                    json!({"plan": [{"description": "summarize X"}]}),
                    json!({"response": "Done"}),
                ],
            ),
    );
    let deps = ChatDeps::new(llm.clone(), Arc::new(Retriever::default()), Toolkit::default());
    let graph = build_chat_graph(&deps, AgentMode::Single, Some(Arc::new(MemorySaver::new()))).unwrap();
    let config = RunnableConfig::for_thread("smart");

    let out = graph
        .invoke(chat_input(Message::user("research X"), &smart_flags()), &config)
        .await
        .unwrap();
    let state = out.state().to_value();

    let steps = past_steps(&state);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step.description, "find X");
    assert_eq!(steps[0].result, "found X");
    assert_eq!(steps[1].step.description, "summarize X");
    assert_eq!(steps[1].result, "summary of X");

    let msgs = messages(&state);
    let last = msgs.last().unwrap();
    assert_eq!(last.content(), "Done");
    assert_eq!(last.step(), Some("Response"));
    let tags: Vec<&str> = msgs.iter().filter_map(Message::step).collect();
    assert_eq!(tags, vec!["Plan", "find X", "summarize X", "Response"]);

    // planner, two worker turns, two replans
    assert_eq!(llm.call_count().await, 5);
    assert_eq!(state["plan"], json!([]));

    let snapshot = graph.get_state(&config).await.unwrap().unwrap();
    assert!(snapshot.next.is_empty());
}

/// **Scenario**: a replan that returns an empty plan completes with the last step's
/// result instead of looping.
#[tokio::test]
async fn empty_replan_completes() {
    let llm = Arc::new(
        MockLlm::with_text("the answer is 42")
            .with_structured("plan", vec![json!({"steps": [{"description": "compute"}]})])
            .with_structured("replan", vec![json!({"plan": []})]),
    );
    let deps = ChatDeps::new(llm, Arc::new(Retriever::default()), Toolkit::default());
    let graph = build_chat_graph(&deps, AgentMode::Single, None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("what is it?"), &smart_flags()), &RunnableConfig::default())
        .await
        .unwrap();
    let msgs = messages(&out.state().to_value());
    let last = msgs.last().unwrap();
    assert_eq!(last.content(), "the answer is 42");
    assert_eq!(last.step(), Some("Response"));
}

async fn shell_toolkit(shell: Arc<MockToolSource>) -> Toolkit {
    Toolkit::load(vec![("shell".to_string(), shell as Arc<dyn ToolSource>)], false)
        .await
        .unwrap()
}

fn shell_turns() -> Vec<LlmResponse> {
    vec![
        LlmResponse::with_tool_calls("", vec![ToolCall::new("c1", "shell_ls", json!({}))]),
        LlmResponse::text("Two files: a.txt and b.txt"),
    ]
}

/// **Scenario**: in supervised mode a plan step goes through the supervisor, which hands
/// it to the shell worker; the worker's answer becomes the step result.
#[tokio::test]
async fn supervised_step_reaches_shell_worker() {
    let shell = Arc::new(MockToolSource::new().with_text_tool("shell_ls", "a.txt\nb.txt"));
    let llm = Arc::new(
        MockLlm::with_responses(shell_turns())
            .with_structured("plan", vec![json!({"steps": [{"description": "list the files"}]})])
            .with_structured(
                "route",
                vec![
                    json!({"next": "shell_worker", "instruction": "run ls"}),
                    json!({"next": "FINISH"}),
                ],
            )
            .with_structured("replan", vec![json!({"response": "Done"})]),
    );
    let deps = ChatDeps::new(llm, Arc::new(Retriever::default()), shell_toolkit(shell.clone()).await);
    let graph = build_chat_graph(&deps, AgentMode::Supervised, None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("what's here?"), &smart_flags()), &RunnableConfig::default())
        .await
        .unwrap();
    let state = out.state().to_value();

    let steps = past_steps(&state);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].result, "Two files: a.txt and b.txt");
    let calls = shell.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "shell_ls");
    assert_eq!(messages(&state).last().unwrap().content(), "Done");
}

/// **Scenario**: a supervised plan step that asks the user suspends the whole run at
/// `execute_step`; resuming reruns the step with the reply and keeps the exchange.
#[tokio::test]
async fn supervised_step_asks_user() {
    let shell = Arc::new(MockToolSource::new().with_text_tool("shell_ls", "a.txt\nb.txt"));
    let llm = Arc::new(
        MockLlm::with_responses(shell_turns())
            .with_structured("plan", vec![json!({"steps": [{"description": "list the files"}]})])
            .with_structured(
                "route",
                vec![
                    json!({"next": "ask_user", "instruction": "Which directory?"}),
                    json!({"next": "shell_worker", "instruction": "run ls"}),
                    json!({"next": "FINISH"}),
                ],
            )
            .with_structured("replan", vec![json!({"response": "Done"})]),
    );
    let deps = ChatDeps::new(llm.clone(), Arc::new(Retriever::default()), shell_toolkit(shell.clone()).await);
    let graph = build_chat_graph(&deps, AgentMode::Supervised, Some(Arc::new(MemorySaver::new()))).unwrap();
    let config = RunnableConfig::for_thread("smart-hitl");

    let out = graph
        .invoke(chat_input(Message::user("what's here?"), &smart_flags()), &config)
        .await
        .unwrap();
    let interrupt = out.interrupt().unwrap();
    assert_eq!(interrupt.node, "execute_step");
    assert_eq!(interrupt.value, json!("Which directory?"));
    assert!(shell.calls().await.is_empty());

    let out = graph.resume(json!("/tmp"), &config).await.unwrap();
    assert!(!out.is_suspended());
    let state = out.state().to_value();
    let contents: Vec<String> = messages(&state).iter().map(|m| m.content().to_string()).collect();
    let asked = contents.iter().position(|c| c == "Which directory?").unwrap();
    assert_eq!(contents[asked + 1], "/tmp");
    assert_eq!(contents[asked + 2], "Two files: a.txt and b.txt");
    assert_eq!(past_steps(&state)[0].result, "Two files: a.txt and b.txt");
    assert_eq!(shell.calls().await.len(), 1);

    let saw_reply = llm
        .calls()
        .await
        .iter()
        .any(|c| c.iter().any(|m| m.content().contains("The user replied: /tmp")));
    assert!(saw_reply);
}
