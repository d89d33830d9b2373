//! In-memory vector store with cosine similarity. Not persistent.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::retrieval::{Document, RetrievalError};

use super::{MetadataFilter, ScoredDocument, VectorStore};

#[derive(Clone)]
struct VectorEntry {
    document: Document,
    vector: Vec<f32>,
    /// Insertion order; ties in score keep it.
    seq: u64,
}

/// Pure in-memory vector store.
///
/// **Interaction**: used as `Arc<dyn VectorStore>` by the retrieve node and the
/// vectorstore worker.
#[derive(Default)]
pub struct InMemoryVectorStore {
    data: DashMap<String, VectorEntry>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns 0.0 if either vector has zero magnitude.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let mut hits: Vec<(f32, u64, Document)> = self
            .data
            .iter()
            .filter(|e| filter.matches(&e.document.metadata))
            .map(|e| {
                (
                    Self::cosine_similarity(query_vector, &e.vector),
                    e.seq,
                    e.document.clone(),
                )
            })
            .collect();
        hits.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(score, _, document)| ScoredDocument { document, score })
            .collect())
    }

    async fn add_documents(
        &self,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<String>, RetrievalError> {
        if documents.len() != vectors.len() {
            return Err(RetrievalError::VectorStore(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            )));
        }
        let base = self.data.len() as u64;
        let mut ids = Vec::with_capacity(documents.len());
        for (i, (document, vector)) in documents.into_iter().zip(vectors).enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            self.data.insert(
                id.clone(),
                VectorEntry {
                    document,
                    vector,
                    seq: base + i as u64,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{index_documents, HashEmbedder, Embedder};
    use serde_json::json;

    fn doc(text: &str, project: &str, source: &str) -> Document {
        Document::new(text).with_metadata("projectId", json!(project)).with_metadata("source", json!(source))
    }

    /// **Scenario**: the closest document ranks first and k bounds the result.
    #[tokio::test]
    async fn search_ranks_by_cosine() {
        let store = InMemoryVectorStore::new();
        let e = HashEmbedder::new(64);
        index_documents(
            &store,
            &e,
            vec![
                doc("tokio runtime scheduler", "p", "a"),
                doc("baking sourdough bread", "p", "b"),
                doc("async runtime in rust", "p", "c"),
            ],
        )
        .await
        .unwrap();
        let q = e.embed("tokio runtime").await.unwrap();
        let hits = store.search(&q, 2, &MetadataFilter::All).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.page_content, "tokio runtime scheduler");
        assert!(hits[0].score >= hits[1].score);
    }

    /// **Scenario**: filters apply before ranking.
    #[tokio::test]
    async fn search_respects_filter() {
        let store = InMemoryVectorStore::new();
        let e = HashEmbedder::new(32);
        index_documents(&store, &e, vec![doc("x", "p1", "a"), doc("x", "p2", "b")])
            .await
            .unwrap();
        let q = e.embed("x").await.unwrap();
        let hits = store
            .search(&q, 3, &MetadataFilter::eq("projectId", "p2"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.metadata["source"], "b");
    }

    #[tokio::test]
    async fn mismatched_vectors_fail() {
        let store = InMemoryVectorStore::new();
        let err = store.add_documents(vec![Document::new("a")], vec![]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::VectorStore(_)));
    }
}
