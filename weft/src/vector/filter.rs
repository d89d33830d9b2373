//! Metadata predicates for vector search.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conjunction/disjunction of equality and inequality predicates over metadata fields.
///
/// `Ne` and `NotIn` hold when the field is missing, so exclusion lists never hide
/// documents that lack the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Matches everything.
    All,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    And { filters: Vec<MetadataFilter> },
    Or { filters: Vec<MetadataFilter> },
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self::All
    }
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Conjunction; an empty list is `All`, a single filter is returned as is.
    pub fn and(mut filters: Vec<MetadataFilter>) -> Self {
        filters.retain(|f| *f != Self::All);
        match filters.len() {
            0 => Self::All,
            1 => filters.remove(0),
            _ => Self::And { filters },
        }
    }

    pub fn or(filters: Vec<MetadataFilter>) -> Self {
        Self::Or { filters }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => metadata.get(field) == Some(value),
            Self::Ne { field, value } => metadata.get(field) != Some(value),
            Self::In { field, values } => metadata
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Self::NotIn { field, values } => metadata
                .get(field)
                .map(|v| !values.contains(v))
                .unwrap_or(true),
            Self::And { filters } => filters.iter().all(|f| f.matches(metadata)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    /// **Scenario**: project scoping plus exclusion list.
    #[test]
    fn project_filter_excludes_sources() {
        let f = MetadataFilter::and(vec![
            MetadataFilter::eq("projectId", "p1"),
            MetadataFilter::not_in("source", vec![json!("a.pdf")]),
        ]);
        assert!(f.matches(&meta(json!({"projectId": "p1", "source": "b.pdf"}))));
        assert!(!f.matches(&meta(json!({"projectId": "p1", "source": "a.pdf"}))));
        assert!(!f.matches(&meta(json!({"projectId": "p2", "source": "b.pdf"}))));
        assert!(f.matches(&meta(json!({"projectId": "p1"}))));
    }

    /// **Scenario**: Ne and NotIn hold for missing fields, In and Eq do not.
    #[test]
    fn missing_fields() {
        let m = meta(json!({}));
        assert!(MetadataFilter::ne("x", 1).matches(&m));
        assert!(MetadataFilter::not_in("x", vec![json!(1)]).matches(&m));
        assert!(!MetadataFilter::eq("x", 1).matches(&m));
        assert!(!MetadataFilter::is_in("x", vec![json!(1)]).matches(&m));
    }

    #[test]
    fn or_and_simplification() {
        assert_eq!(MetadataFilter::and(vec![]), MetadataFilter::All);
        let one = MetadataFilter::eq("a", 1);
        assert_eq!(MetadataFilter::and(vec![one.clone(), MetadataFilter::All]), one);
        let f = MetadataFilter::or(vec![MetadataFilter::eq("a", 1), MetadataFilter::eq("a", 2)]);
        assert!(f.matches(&meta(json!({"a": 2}))));
        assert!(!f.matches(&meta(json!({"a": 3}))));
    }
}
