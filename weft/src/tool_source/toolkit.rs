//! Tools from every server, grouped by capability.
//!
//! A tool belongs to the capability named by its prefix: `file_` filesystem, `shell_`
//! shell, `browser_` browser. Everything else is general. Each group is a
//! [`ScopedTools`] that routes calls back to the source that listed the tool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Filesystem,
    Shell,
    Browser,
    General,
}

impl Capability {
    pub fn of_tool(name: &str) -> Self {
        if name.starts_with("file_") {
            Self::Filesystem
        } else if name.starts_with("shell_") {
            Self::Shell
        } else if name.starts_with("browser_") {
            Self::Browser
        } else {
            Self::General
        }
    }
}

/// A subset of tools, each bound to the source that owns it.
#[derive(Clone, Default)]
pub struct ScopedTools {
    specs: Vec<ToolSpec>,
    owners: HashMap<String, Arc<dyn ToolSource>>,
}

impl ScopedTools {
    fn push(&mut self, spec: ToolSpec, owner: Arc<dyn ToolSource>) {
        if self.owners.contains_key(&spec.name) {
            tracing::warn!(tool = %spec.name, "duplicate tool name; keeping the first");
            return;
        }
        self.owners.insert(spec.name.clone(), owner);
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }
}

#[async_trait]
impl ToolSource for ScopedTools {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        Ok(self.specs.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let owner = self
            .owners
            .get(name)
            .ok_or_else(|| ToolSourceError::NotFound(name.to_string()))?;
        owner.call_tool(name, arguments).await
    }
}

/// Loaded tools: one scope per capability plus all of them together.
#[derive(Clone, Default)]
pub struct Toolkit {
    pub filesystem: ScopedTools,
    pub shell: ScopedTools,
    pub browser: ScopedTools,
    pub general: ScopedTools,
    pub all: ScopedTools,
}

impl Toolkit {
    /// Lists every source. A source that fails to list is fatal unless
    /// `ignore_load_errors`, in which case it is skipped with a warning.
    pub async fn load(
        sources: Vec<(String, Arc<dyn ToolSource>)>,
        ignore_load_errors: bool,
    ) -> Result<Self, ToolSourceError> {
        let mut kit = Self::default();
        for (server, source) in sources {
            let specs = match source.list_tools().await {
                Ok(specs) => specs,
                Err(error) if ignore_load_errors => {
                    tracing::warn!(%server, %error, "tool load failed; skipping server");
                    continue;
                }
                Err(error) => return Err(error),
            };
            tracing::debug!(%server, tools = specs.len(), "loaded tools");
            for spec in specs {
                kit.all.push(spec.clone(), source.clone());
                kit.scope_mut(Capability::of_tool(&spec.name))
                    .push(spec, source.clone());
            }
        }
        Ok(kit)
    }

    pub fn scope(&self, capability: Capability) -> &ScopedTools {
        match capability {
            Capability::Filesystem => &self.filesystem,
            Capability::Shell => &self.shell,
            Capability::Browser => &self.browser,
            Capability::General => &self.general,
        }
    }

    fn scope_mut(&mut self, capability: Capability) -> &mut ScopedTools {
        match capability {
            Capability::Filesystem => &mut self.filesystem,
            Capability::Shell => &mut self.shell,
            Capability::Browser => &mut self.browser,
            Capability::General => &mut self.general,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_source::MockToolSource;
    use serde_json::json;

    fn sandbox() -> Arc<dyn ToolSource> {
        Arc::new(
            MockToolSource::new()
                .with_text_tool("file_read", "text")
                .with_text_tool("shell_exec", "ok")
                .with_text_tool("browser_view", "page")
                .with_text_tool("search", "hits"),
        )
    }

    /// **Scenario**: tools are grouped by prefix and calls reach the owning source.
    #[tokio::test]
    async fn groups_by_prefix_and_routes_calls() {
        let kit = Toolkit::load(vec![("sandbox".into(), sandbox())], false)
            .await
            .unwrap();
        assert_eq!(kit.filesystem.specs()[0].name, "file_read");
        assert_eq!(kit.shell.len(), 1);
        assert_eq!(kit.browser.len(), 1);
        assert_eq!(kit.general.specs()[0].name, "search");
        assert_eq!(kit.all.len(), 4);
        let out = kit.shell.call_tool("shell_exec", json!({})).await.unwrap();
        assert_eq!(out.text, "ok");
        assert!(matches!(
            kit.shell.call_tool("file_read", json!({})).await,
            Err(ToolSourceError::NotFound(_))
        ));
    }

    /// **Scenario**: a failing server aborts loading unless load errors are ignored.
    #[tokio::test]
    async fn load_errors_are_fatal_unless_ignored() {
        let sources = || -> Vec<(String, Arc<dyn ToolSource>)> {
            vec![
                ("down".into(), Arc::new(MockToolSource::failing("refused")) as Arc<dyn ToolSource>),
                ("sandbox".into(), sandbox()),
            ]
        };
        assert!(Toolkit::load(sources(), false).await.is_err());
        let kit = Toolkit::load(sources(), true).await.unwrap();
        assert_eq!(kit.all.len(), 4);
    }
}
