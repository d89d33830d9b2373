//! Web search providers and the primary/fallback chain used by the retrieve node.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::loader::{load_or_empty, DocumentDescriptor, DocumentLoader};
use super::{Document, RetrievalError};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Snippet or extracted content; may be empty for link-only providers.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Provider name stored as `metadata.source`.
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<WebResult>, RetrievalError>;
}

/// Tavily search API (`basic` depth, general topic).
#[derive(Clone)]
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
            max_results: 5,
        }
    }

    /// Overrides the API URL (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<WebResult>, RetrievalError> {
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "topic": "general",
            "search_depth": "basic",
            "include_images": false,
            "max_results": self.max_results,
        });
        let res = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let err_body = res.text().await.unwrap_or_default();
            return Err(RetrievalError::Search(format!(
                "Tavily API error {}: {}",
                status, err_body
            )));
        }
        let out: TavilyResponse = res
            .json()
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;
        Ok(out.results)
    }
}

/// Primary provider, else fallback provider plus a best-effort fetch of each result URL.
#[derive(Clone, Default)]
pub struct WebSearchChain {
    pub primary: Option<Arc<dyn WebSearch>>,
    pub fallback: Option<Arc<dyn WebSearch>>,
    /// Fetches fallback result pages; without it the snippets are used.
    pub loader: Option<Arc<dyn DocumentLoader>>,
}

impl WebSearchChain {
    pub fn new(primary: Option<Arc<dyn WebSearch>>) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    pub fn with_fallback(
        mut self,
        fallback: Arc<dyn WebSearch>,
        loader: Option<Arc<dyn DocumentLoader>>,
    ) -> Self {
        self.fallback = Some(fallback);
        self.loader = loader;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Documents for one query.
    pub async fn search_documents(&self, query: &str) -> Result<Vec<Document>, RetrievalError> {
        if let Some(primary) = &self.primary {
            match primary.search(query).await {
                Ok(results) => {
                    return Ok(results
                        .into_iter()
                        .map(|r| primary_document(primary.name(), r))
                        .collect())
                }
                Err(error) if self.fallback.is_some() => {
                    tracing::warn!(provider = primary.name(), %error, "primary web search failed; using fallback");
                }
                Err(error) => return Err(error),
            }
        }
        let Some(fallback) = &self.fallback else {
            return Err(RetrievalError::Search(
                "no web search provider configured".to_string(),
            ));
        };
        let results = fallback.search(query).await?;
        let pages = join_all(results.iter().map(|r| self.fetch(&r.url))).await;
        Ok(results
            .into_iter()
            .zip(pages)
            .map(|(r, page)| {
                let body = if page.is_empty() { r.content.clone() } else { page };
                Document::new(format!("{}\n{}\n{}", r.title, r.url, body))
                    .with_metadata("source", json!(fallback.name()))
                    .with_metadata("url", json!(r.url))
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> String {
        let Some(loader) = &self.loader else {
            return String::new();
        };
        let descriptor = DocumentDescriptor::Url {
            url: url.to_string(),
        };
        load_or_empty(loader.as_ref(), &descriptor)
            .await
            .into_iter()
            .map(|d| d.page_content)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn primary_document(provider: &str, r: WebResult) -> Document {
    let head = match r.score {
        Some(score) => format!("{}. {}", score, r.title),
        None => r.title.clone(),
    };
    Document::new(format!("{}\n{}\n{}", head, r.url, r.content))
        .with_metadata("source", json!(provider))
        .with_metadata("url", json!(r.url))
}
