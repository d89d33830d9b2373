//! Conditional edges: route to the next node based on state.
//!
//! A source node has a routing function that takes the state (after the superstep's
//! updates are merged) and returns a key. With a path map, the key must be one of the
//! map's keys; without one, the key itself must be a node id or END. Anything else is
//! a `GraphError::UnmappedRoute`.

use std::collections::HashMap;
use std::sync::Arc;

use super::GraphState;

/// Router function: takes the merged state and returns a routing key.
pub type ConditionalRouterFn = Arc<dyn Fn(&GraphState) -> String + Send + Sync>;

/// Routing function plus optional key -> node map.
#[derive(Clone)]
pub struct ConditionalRouter {
    pub(super) path: ConditionalRouterFn,
    pub(super) path_map: Option<HashMap<String, String>>,
}

impl ConditionalRouter {
    pub fn new(path: ConditionalRouterFn, path_map: Option<HashMap<String, String>>) -> Self {
        Self { path, path_map }
    }

    /// Evaluates the router. Returns `(key, target)`; target is `None` when the key is
    /// not covered by the path map.
    pub fn resolve(&self, state: &GraphState) -> (String, Option<String>) {
        let key = (self.path)(state);
        let target = match &self.path_map {
            Some(map) => map.get(&key).cloned(),
            None => Some(key.clone()),
        };
        (key, target)
    }

    /// Declared targets, when a path map is present.
    pub fn targets(&self) -> Option<impl Iterator<Item = &String>> {
        self.path_map.as_ref().map(|m| m.values())
    }
}

impl std::fmt::Debug for ConditionalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalRouter")
            .field("path", &"<fn>")
            .field("path_map", &self.path_map)
            .finish()
    }
}

/// Builds a path map from `(key, target)` pairs.
pub fn path_map<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
