//! Retrieval backends used by the retrieve node and the vectorstore worker.

use std::sync::Arc;

use serde_json::Value;

use crate::state::ChatFlags;
use crate::vector::{Embedder, MetadataFilter, VectorStore};

use super::{Document, RetrievalError, WebSearchChain};

/// Default number of vector hits per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Embedder plus the store it indexes into.
#[derive(Clone)]
pub struct VectorIndex {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

/// Project-scoped vector search and web search behind one handle.
///
/// **Interaction**: shared as `Arc<Retriever>` by `RetrieveNode` and `VectorstoreWorker`.
#[derive(Clone)]
pub struct Retriever {
    index: Option<VectorIndex>,
    web: WebSearchChain,
    top_k: usize,
}

impl Default for Retriever {
    fn default() -> Self {
        Self {
            index: None,
            web: WebSearchChain::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Retriever {
    pub fn new(index: Option<VectorIndex>, web: WebSearchChain) -> Self {
        Self {
            index,
            web,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn web(&self) -> &WebSearchChain {
        &self.web
    }

    /// Search filter: the active project, minus excluded sources.
    pub fn filter_for(project_id: &str, excluded: &[String]) -> MetadataFilter {
        let mut parts = vec![MetadataFilter::eq("projectId", project_id)];
        if !excluded.is_empty() {
            parts.push(MetadataFilter::not_in(
                "source",
                excluded.iter().map(|s| Value::String(s.clone())).collect(),
            ));
        }
        MetadataFilter::and(parts)
    }

    /// Top-k documents for `query` within the flagged project.
    ///
    /// No project or no index yields no documents.
    pub async fn vector_search(
        &self,
        query: &str,
        flags: &ChatFlags,
    ) -> Result<Vec<Document>, RetrievalError> {
        let (Some(index), Some(project_id)) = (&self.index, flags.project_id.as_deref()) else {
            return Ok(Vec::new());
        };
        let vector = index.embedder.embed(query).await?;
        let filter = Self::filter_for(project_id, &flags.excluded_documents);
        let hits = index.store.search(&vector, self.top_k, &filter).await?;
        tracing::debug!(query, hits = hits.len(), "vector search");
        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    pub async fn web_search(&self, query: &str) -> Result<Vec<Document>, RetrievalError> {
        self.web.search_documents(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{index_documents, HashEmbedder, InMemoryVectorStore};
    use serde_json::json;

    async fn seeded() -> Retriever {
        let embedder = Arc::new(HashEmbedder::new(64));
        let store = Arc::new(InMemoryVectorStore::new());
        let docs = vec![
            Document::new("rust borrow checker")
                .with_metadata("projectId", json!("p1"))
                .with_metadata("source", json!("a.md")),
            Document::new("rust lifetimes")
                .with_metadata("projectId", json!("p1"))
                .with_metadata("source", json!("b.md")),
            Document::new("rust ownership")
                .with_metadata("projectId", json!("p2"))
                .with_metadata("source", json!("c.md")),
        ];
        index_documents(store.as_ref(), embedder.as_ref(), docs)
            .await
            .unwrap();
        Retriever::new(
            Some(VectorIndex { embedder, store }),
            WebSearchChain::default(),
        )
    }

    /// **Scenario**: search stays inside the project and skips excluded sources.
    #[tokio::test]
    async fn vector_search_scopes_and_excludes() {
        let r = seeded().await;
        let flags = ChatFlags {
            project_id: Some("p1".into()),
            excluded_documents: vec!["a.md".into()],
            ..ChatFlags::default()
        };
        let docs = r.vector_search("rust", &flags).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), Some("b.md"));
    }

    /// **Scenario**: without a project id nothing is searched.
    #[tokio::test]
    async fn vector_search_without_project_is_empty() {
        let r = seeded().await;
        let docs = r.vector_search("rust", &ChatFlags::default()).await.unwrap();
        assert!(docs.is_empty());
    }
}
