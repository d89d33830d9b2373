//! Embedding and vector search boundaries.
//!
//! [`Embedder`] turns text into vectors; [`VectorStore`] ranks stored documents against
//! a query vector under a [`MetadataFilter`]. [`InMemoryVectorStore`] is a cosine
//! similarity store for tests and small deployments.

mod filter;
mod hash_embedder;
mod in_memory;

pub use filter::MetadataFilter;
pub use hash_embedder::HashEmbedder;
pub use in_memory::InMemoryVectorStore;

use async_trait::async_trait;

use crate::retrieval::{Document, RetrievalError};

/// Produces fixed-size float vectors from text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// One vector per input, same order. Default embeds one by one.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// A search hit. Higher score is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Similarity search over stored documents.
///
/// **Interaction**: the retrieve node and the vectorstore worker search with a
/// project/exclusion filter; loaders or ingestion code call `add_documents`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` documents matching `filter`, best first.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;

    /// Stores documents with precomputed vectors. Returns the new ids.
    async fn add_documents(
        &self,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<String>, RetrievalError>;
}

/// Embeds `documents` with `embedder` and stores them.
pub async fn index_documents(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    documents: Vec<Document>,
) -> Result<Vec<String>, RetrievalError> {
    let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    store.add_documents(documents, vectors).await
}
