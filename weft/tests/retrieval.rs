//! Retrieval sub-graph end to end: query generation, partial search failure, grading.

mod init_logging;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use weft::llm::{LlmError, OutputSchema, StructuredFn};
use weft::retrieval::{
    build_retrieval_graph, DocumentDescriptor, DocumentLoader, WebResult, WebSearch,
};
use weft::vector::{index_documents, Embedder, VectorStore};
use weft::{
    chat_input, ChatFlags, Document, GraphError, HashEmbedder, InMemoryVectorStore, Message, MockLlm,
    RetrievalError, Retriever, RunnableConfig, VectorIndex, WebSearchChain,
};

/// Answers every query with one result per entry in `per_query`; queries containing
/// "broken" fail.
struct ScriptedSearch {
    per_query: Vec<&'static str>,
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str) -> Result<Vec<WebResult>, RetrievalError> {
        if query.contains("broken") {
            return Err(RetrievalError::Search("upstream timeout".into()));
        }
        Ok(self
            .per_query
            .iter()
            .map(|tag| WebResult {
                url: format!("https://example.test/{}/{}", query, tag),
                title: format!("{} {}", query, tag),
                content: format!("{} about {}", tag, query),
                score: None,
            })
            .collect())
    }
}

/// Returns the full page for every URL except those containing `fail_on`.
struct FlakyLoader {
    fail_on: &'static str,
}

#[async_trait]
impl DocumentLoader for FlakyLoader {
    async fn load(&self, descriptor: &DocumentDescriptor) -> Result<Vec<Document>, RetrievalError> {
        let url = descriptor.source();
        if url.contains(self.fail_on) {
            return Err(RetrievalError::Loader(format!("fetch failed: {}", url)));
        }
        Ok(vec![Document::new(format!("full page of {}", url))])
    }
}

fn documents(state: &Value) -> Vec<Document> {
    serde_json::from_value(state["documents"].clone()).unwrap()
}

fn relevant_unless(marker: &'static str) -> StructuredFn {
    Arc::new(move |schema: &OutputSchema, messages: &[Message]| {
        (schema.name == "grade").then(|| {
            let doc = messages.get(1).map(|m| m.content()).unwrap_or_default();
            Ok::<_, LlmError>(json!({"relevant": !doc.contains(marker)}))
        })
    })
}

fn web_flags() -> ChatFlags {
    ChatFlags {
        web_search: true,
        ..ChatFlags::default()
    }
}

/// **Scenario**: one of three web queries fails; the turn still succeeds with the
/// documents of the other two.
#[tokio::test]
async fn failing_query_is_skipped() {
    let llm = Arc::new(
        MockLlm::default()
            .with_structured(
                "generate_query",
                vec![json!({"webSearchQueries": ["alpha", "broken beta", "gamma"]})],
            )
            .with_structured_fn(relevant_unless("never")),
    );
    let search: Arc<dyn WebSearch> = Arc::new(ScriptedSearch { per_query: vec!["r1"] });
    let chain = WebSearchChain::new(Some(search));
    let graph = build_retrieval_graph(llm, Arc::new(Retriever::new(None, chain)), None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("tell me things"), &web_flags()), &RunnableConfig::default())
        .await
        .unwrap();
    let docs = documents(&out.state().to_value());
    assert_eq!(docs.len(), 2);
    let mut urls: Vec<String> = docs
        .iter()
        .filter_map(|d| d.metadata.get("url").and_then(Value::as_str).map(String::from))
        .collect();
    urls.sort();
    assert_eq!(
        urls,
        vec!["https://example.test/alpha/r1", "https://example.test/gamma/r1"]
    );
    assert!(docs.iter().all(|d| d.source() == Some("scripted")));
}

/// **Scenario**: five retrieved documents, two graded irrelevant, leave exactly three;
/// the grader sees each document on its own.
#[tokio::test]
async fn grading_keeps_relevant_subset() {
    let llm = Arc::new(
        MockLlm::default()
            .with_structured("generate_query", vec![json!({"webSearchQueries": ["tokio"]})])
            .with_structured_fn(relevant_unless("off-topic")),
    );
    let search: Arc<dyn WebSearch> = Arc::new(ScriptedSearch {
        per_query: vec!["runtime", "off-topic-1", "tasks", "off-topic-2", "channels"],
    });
    let chain = WebSearchChain::new(Some(search));
    let graph = build_retrieval_graph(llm.clone(), Arc::new(Retriever::new(None, chain)), None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("how does tokio work"), &web_flags()), &RunnableConfig::default())
        .await
        .unwrap();
    let docs = documents(&out.state().to_value());
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| !d.page_content.contains("off-topic")));

    let grade_calls: Vec<Vec<Message>> = llm
        .calls()
        .await
        .into_iter()
        .filter(|c| c.get(1).is_some_and(|m| m.content().starts_with("Retrieved document:\n")))
        .collect();
    assert_eq!(grade_calls.len(), 5);
}

/// **Scenario**: vector retrieval stays inside the flagged project and honors
/// excluded sources.
#[tokio::test]
async fn vector_search_scoped_to_project() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    index_documents(
        store.as_ref(),
        embedder.as_ref(),
        vec![
            Document::new("rust async runtime notes")
                .with_metadata("projectId", json!("p1"))
                .with_metadata("source", json!("notes.md")),
            Document::new("rust async runtime secrets")
                .with_metadata("projectId", json!("p1"))
                .with_metadata("source", json!("secret.md")),
            Document::new("rust async runtime elsewhere")
                .with_metadata("projectId", json!("p2"))
                .with_metadata("source", json!("other.md")),
        ],
    )
    .await
    .unwrap();
    let index = VectorIndex { embedder, store };

    let llm = Arc::new(
        MockLlm::default()
            .with_structured("generate_query", vec![json!({"vectorStoreQueries": ["rust async runtime"]})])
            .with_structured_fn(relevant_unless("never")),
    );
    let retriever = Retriever::new(Some(index), WebSearchChain::default());
    let graph = build_retrieval_graph(llm, Arc::new(retriever), None).unwrap();
    let flags = ChatFlags {
        project_id: Some("p1".into()),
        excluded_documents: vec!["secret.md".into()],
        ..ChatFlags::default()
    };

    let out = graph
        .invoke(chat_input(Message::user("runtime?"), &flags), &RunnableConfig::default())
        .await
        .unwrap();
    let docs = documents(&out.state().to_value());
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source(), Some("notes.md"));
}

/// **Scenario**: with only the fallback provider configured, a page fetch that fails
/// for one of three queries keeps that result's snippet; the other two carry the
/// fetched pages and nothing is dropped.
#[tokio::test]
async fn failing_page_fetch_keeps_siblings() {
    let llm = Arc::new(
        MockLlm::default()
            .with_structured(
                "generate_query",
                vec![json!({"webSearchQueries": ["alpha", "beta", "gamma"]})],
            )
            .with_structured_fn(relevant_unless("never")),
    );
    let fallback: Arc<dyn WebSearch> = Arc::new(ScriptedSearch { per_query: vec!["r1"] });
    let loader: Arc<dyn DocumentLoader> = Arc::new(FlakyLoader { fail_on: "/beta/" });
    let chain = WebSearchChain::new(None).with_fallback(fallback, Some(loader));
    let graph = build_retrieval_graph(llm, Arc::new(Retriever::new(None, chain)), None).unwrap();

    let out = graph
        .invoke(chat_input(Message::user("tell me things"), &web_flags()), &RunnableConfig::default())
        .await
        .unwrap();
    let docs = documents(&out.state().to_value());
    assert_eq!(docs.len(), 3);
    for query in ["alpha", "gamma"] {
        let page = format!("full page of https://example.test/{}/r1", query);
        assert!(
            docs.iter().any(|d| d.page_content.contains(&page)),
            "missing fetched page for {}",
            query
        );
    }
    let beta = docs
        .iter()
        .find(|d| d.metadata.get("url") == Some(&json!("https://example.test/beta/r1")))
        .unwrap();
    assert!(beta.page_content.contains("r1 about beta"));
    assert!(!beta.page_content.contains("full page"));
}

/// **Scenario**: a grading call that errors fails the run at `grade_documents`
/// instead of silently shrinking the document list.
#[tokio::test]
async fn grading_error_fails_run() {
    let llm = Arc::new(
        MockLlm::default()
            .with_structured("generate_query", vec![json!({"webSearchQueries": ["tokio"]})])
            .with_structured_fn(Arc::new(|schema: &OutputSchema, messages: &[Message]| {
                (schema.name == "grade").then(|| {
                    let doc = messages.get(1).map(|m| m.content()).unwrap_or_default();
                    if doc.contains("flaky") {
                        Err(LlmError::Provider("timeout".into()))
                    } else {
                        Ok(json!({"relevant": true}))
                    }
                })
            })),
    );
    let search: Arc<dyn WebSearch> = Arc::new(ScriptedSearch { per_query: vec!["stable", "flaky"] });
    let chain = WebSearchChain::new(Some(search));
    let graph = build_retrieval_graph(llm, Arc::new(Retriever::new(None, chain)), None).unwrap();

    let err = graph
        .invoke(chat_input(Message::user("tokio?"), &web_flags()), &RunnableConfig::default())
        .await
        .unwrap_err();
    match err {
        GraphError::Node { node, .. } => assert_eq!(node, "grade_documents"),
        other => panic!("unexpected {:?}", other),
    }
}
