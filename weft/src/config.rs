//! Runtime settings read from the environment, and the dependencies they describe.
//!
//! [`WeftConfig::load`] applies `.env` and the XDG `config.toml` through `env_config`,
//! then reads the typed settings below.
//!
//! | variable                       | default | meaning                                   |
//! |--------------------------------|---------|-------------------------------------------|
//! | `WEFT_DB_PATH`                 | unset   | SQLite checkpoint file; unset = in-memory |
//! | `WEFT_THREAD_ID`               | unset   | thread addressed by runs                  |
//! | `WEFT_RECURSION_LIMIT`         | 25      | supersteps per run                        |
//! | `WEFT_MAX_WORKER_ITERATIONS`   | 10      | model turns per worker run                |
//! | `WEFT_RETRIEVAL_TOP_K`         | 3       | vector hits per query                     |
//! | `WEFT_IGNORE_TOOL_LOAD_ERRORS` | false   | skip tool servers that fail to load       |
//! | `TAVILY_API_KEY`               | unset   | primary web search provider               |
//! | `WEFT_CRAWL_URL`               | unset   | document loader / page fetch service      |
//! | `WEFT_MCP_SERVERS`             | empty   | comma-separated `name=url` tool servers   |

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::agent::{ChatDeps, DEFAULT_MAX_ITERATIONS};
use crate::graph::DEFAULT_RECURSION_LIMIT;
use crate::llm::LlmClient;
use crate::memory::{CheckpointError, Checkpointer, MemorySaver, RunnableConfig, SqliteSaver};
use crate::retrieval::{
    DocumentLoader, HttpDocumentLoader, Retriever, TavilySearch, VectorIndex, WebSearch,
    WebSearchChain, DEFAULT_TOP_K,
};
use crate::tool_source::{McpHttpToolSource, ToolSource, ToolSourceError, Toolkit};

/// Name under `$XDG_CONFIG_HOME` and the `.env` app name.
pub const APP_NAME: &str = "weft";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] env_config::LoadError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Tool(#[from] ToolSourceError),
}

/// Typed runtime settings.
#[derive(Clone, Debug, PartialEq)]
pub struct WeftConfig {
    pub db_path: Option<String>,
    pub thread_id: Option<String>,
    pub recursion_limit: usize,
    pub max_worker_iterations: usize,
    pub retrieval_top_k: usize,
    pub ignore_tool_load_errors: bool,
    pub tavily_api_key: Option<String>,
    pub crawl_url: Option<String>,
    /// `(name, url)` per tool server, in declaration order.
    pub mcp_servers: Vec<(String, String)>,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            thread_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_worker_iterations: DEFAULT_MAX_ITERATIONS,
            retrieval_top_k: DEFAULT_TOP_K,
            ignore_tool_load_errors: false,
            tavily_api_key: None,
            crawl_url: None,
            mcp_servers: Vec::new(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(s) => s.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %s, "invalid setting; using default");
            default
        }),
    }
}

/// `name=url,name=url`; malformed entries are skipped.
fn parse_mcp_servers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Some((name.trim().to_string(), url.trim().to_string()))
            }
            _ => {
                tracing::warn!(entry, "ignoring malformed WEFT_MCP_SERVERS entry");
                None
            }
        })
        .collect()
}

impl WeftConfig {
    /// Applies `.env` (from `dir`, default current directory) and XDG config, then reads
    /// the environment.
    pub fn load(dir: Option<&Path>) -> Result<Self, ConfigError> {
        env_config::load_and_apply(APP_NAME, dir)?;
        Ok(Self::from_env())
    }

    /// Builds config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            db_path: non_empty("WEFT_DB_PATH"),
            thread_id: non_empty("WEFT_THREAD_ID"),
            recursion_limit: parse_or(get("WEFT_RECURSION_LIMIT"), "WEFT_RECURSION_LIMIT", DEFAULT_RECURSION_LIMIT),
            max_worker_iterations: parse_or(
                get("WEFT_MAX_WORKER_ITERATIONS"),
                "WEFT_MAX_WORKER_ITERATIONS",
                DEFAULT_MAX_ITERATIONS,
            ),
            retrieval_top_k: parse_or(get("WEFT_RETRIEVAL_TOP_K"), "WEFT_RETRIEVAL_TOP_K", DEFAULT_TOP_K),
            ignore_tool_load_errors: parse_or(
                get("WEFT_IGNORE_TOOL_LOAD_ERRORS"),
                "WEFT_IGNORE_TOOL_LOAD_ERRORS",
                false,
            ),
            tavily_api_key: non_empty("TAVILY_API_KEY"),
            crawl_url: non_empty("WEFT_CRAWL_URL"),
            mcp_servers: get("WEFT_MCP_SERVERS")
                .map(|raw| parse_mcp_servers(&raw))
                .unwrap_or_default(),
        }
    }

    /// Run config for the configured thread.
    pub fn runnable_config(&self) -> RunnableConfig {
        RunnableConfig {
            thread_id: self.thread_id.clone(),
            ..RunnableConfig::default()
        }
    }

    /// SQLite saver at `db_path`, or an in-memory saver.
    pub fn open_checkpointer(&self) -> Result<Arc<dyn Checkpointer>, CheckpointError> {
        match &self.db_path {
            Some(path) => {
                tracing::info!(%path, "using sqlite checkpoints");
                Ok(Arc::new(SqliteSaver::new(path)?))
            }
            None => Ok(Arc::new(MemorySaver::new())),
        }
    }

    /// Tavily when a key is set; crawl service (if any) fetches result pages.
    pub fn web_search_chain(&self) -> WebSearchChain {
        let mut chain = WebSearchChain::new(
            self.tavily_api_key
                .as_ref()
                .map(|key| Arc::new(TavilySearch::new(key.clone())) as Arc<dyn WebSearch>),
        );
        chain.loader = self
            .crawl_url
            .as_ref()
            .map(|url| Arc::new(HttpDocumentLoader::new(url.clone())) as Arc<dyn DocumentLoader>);
        chain
    }

    pub fn retriever(&self, index: Option<VectorIndex>) -> Retriever {
        Retriever::new(index, self.web_search_chain()).with_top_k(self.retrieval_top_k)
    }

    /// Connects every configured tool server. A server that cannot be reached is fatal
    /// unless `ignore_tool_load_errors`.
    pub async fn tool_sources(&self) -> Result<Vec<(String, Arc<dyn ToolSource>)>, ToolSourceError> {
        let mut sources: Vec<(String, Arc<dyn ToolSource>)> = Vec::new();
        for (name, url) in &self.mcp_servers {
            match McpHttpToolSource::connect(name.clone(), url.clone(), Vec::new()).await {
                Ok(source) => sources.push((name.clone(), Arc::new(source))),
                Err(error) if self.ignore_tool_load_errors => {
                    tracing::warn!(server = %name, %error, "tool server unreachable; skipping");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(sources)
    }

    /// Everything a chat graph needs, with tools loaded from the configured servers.
    pub async fn chat_deps(
        &self,
        llm: Arc<dyn LlmClient>,
        index: Option<VectorIndex>,
    ) -> Result<ChatDeps, ConfigError> {
        let toolkit = Toolkit::load(self.tool_sources().await?, self.ignore_tool_load_errors).await?;
        let mut deps = ChatDeps::new(llm, Arc::new(self.retriever(index)), toolkit);
        deps.max_worker_iterations = self.max_worker_iterations;
        deps.recursion_limit = self.recursion_limit;
        Ok(deps)
    }
}
