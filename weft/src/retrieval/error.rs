use thiserror::Error;

/// Failures of embedding, vector search, web search and document loading.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector store: {0}")]
    VectorStore(String),
    #[error("web search: {0}")]
    Search(String),
    #[error("document loader: {0}")]
    Loader(String),
}
