//! Transformation module.
//!
//! This module handles tree-to-tree data transforms:
//! - Transformer: the capability every transform implements
//! - Chain: drives transformers over the tree at their declared depth
//! - Registry: builds transformers by keyword from JSON options
//! - Builtins: filter, select, combine, stats, histogram

pub mod builtin;
pub mod chain;
pub mod histogram;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransformResult;
use crate::models::Node;

pub use builtin::{Combine, FilterFields, SelectField, Stats};
pub use chain::{apply_transformer, PathFailure, TransformChain, Transformed};
pub use histogram::{Aggregate, BinMode, Histogram};
pub use registry::{TransformFactory, TransformRegistry};

/// A tree transform operating on the subtrees found at a fixed depth.
pub trait Transformer: Send + Sync {
    /// Keyword the transform was registered under.
    fn name(&self) -> &str;

    /// Nesting depth of the subtrees handed to [`Transformer::apply`],
    /// counted from the deepest level upward: `0` receives leaves, `1`
    /// receives mappings of leaves, and so on.
    fn levels(&self) -> usize;

    /// Transform one subtree. `Ok(None)` removes it from the tree.
    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>>;
}

/// One transform as written in a pipeline configuration.
///
/// ```json
/// {"type": "histogram", "bins": 20, "aggregate": ["normalized-total"]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformStep {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl TransformStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }
}

/// Get a description of all built-in transforms
pub fn transforms_description() -> String {
    r#"Available transforms:

| Transform | Levels | Description | Parameters |
|-----------|--------|-------------|------------|
| filter | 1 | Keep only the named fields of each leaf mapping | fields: list of field names |
| select | 2 | Replace each child by its first available field | fields: candidate names, default: value when none match |
| combine | 2 | Pair every two siblings on a common field | fields: candidate names |
| stats | 0 | Summary statistics of a numeric series | - |
| histogram | 0 | Bin a numeric series | bins: count, "log-N" or "discrete"; min, max, binsize; aggregate: list |

Histogram aggregates: normalized-total, normalized-max, cumulative, reverse-cumulative

Example transforms in JSON:
[
  {"type": "filter", "fields": ["mean", "stddev"]},
  {"type": "select", "fields": ["pvalue", "qvalue"], "default": 1},
  {"type": "histogram", "bins": "log-20", "aggregate": ["cumulative"]}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_flattens_options() {
        let step: TransformStep =
            serde_json::from_value(json!({"type": "filter", "fields": ["a"]})).unwrap();
        assert_eq!(step.name, "filter");
        assert_eq!(step.options["fields"], json!(["a"]));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back, json!({"type": "filter", "fields": ["a"]}));
    }
}
