//! Document loader boundary: turns a descriptor into extracted text.
//!
//! Conversion and crawling run in an external service; [`HttpDocumentLoader`] posts the
//! descriptor to it. Callers inside the graph use [`load_or_empty`] so a failed load
//! never fails the node.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Document, RetrievalError};

/// What to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentDescriptor {
    File { path: PathBuf },
    Url { url: String },
    /// Crawl a site starting at `url`.
    Site {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_depth: Option<u32>,
    },
    /// Transcript of a video.
    Video { url: String },
}

impl DocumentDescriptor {
    /// Value stored as `metadata.source` on loaded documents.
    pub fn source(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Url { url } | Self::Site { url, .. } | Self::Video { url } => url.clone(),
        }
    }
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, descriptor: &DocumentDescriptor) -> Result<Vec<Document>, RetrievalError>;
}

/// Loads, or logs the failure and returns no documents.
pub async fn load_or_empty(loader: &dyn DocumentLoader, descriptor: &DocumentDescriptor) -> Vec<Document> {
    match loader.load(descriptor).await {
        Ok(docs) => docs,
        Err(error) => {
            tracing::warn!(source = %descriptor.source(), %error, "document load failed; continuing without it");
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
struct CrawlResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    content: Option<String>,
}

/// Loader backed by a crawl/convert service.
///
/// Local files are read directly; everything else is POSTed as `{"descriptor": ...}` to
/// the service, which answers with `{"documents": [...]}` or `{"content": "..."}`.
#[derive(Clone)]
pub struct HttpDocumentLoader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDocumentLoader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    /// - `client`: custom reqwest::Client for timeouts, proxies, etc.
    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, descriptor: &DocumentDescriptor) -> Result<Vec<Document>, RetrievalError> {
        let source = descriptor.source();
        if let DocumentDescriptor::File { path } = descriptor {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RetrievalError::Loader(format!("{}: {}", source, e)))?;
            return Ok(vec![Document::new(text).with_metadata("source", json!(source))]);
        }

        let res = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "descriptor": descriptor }))
            .send()
            .await
            .map_err(|e| RetrievalError::Loader(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RetrievalError::Loader(format!(
                "crawl service error {}: {}",
                status, body
            )));
        }
        let body: CrawlResponse = res
            .json()
            .await
            .map_err(|e| RetrievalError::Loader(e.to_string()))?;
        let mut docs = body.documents;
        if let Some(content) = body.content {
            docs.push(Document::new(content));
        }
        for d in &mut docs {
            d.metadata
                .entry("source".to_string())
                .or_insert_with(|| json!(source));
        }
        Ok(docs)
    }
}
