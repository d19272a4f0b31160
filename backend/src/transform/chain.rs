//! Transform chain driver
//!
//! Runs transformers in declaration order. Each transformer visits the
//! cartesian product of the label sets above its declared depth, once per
//! path, replacing or removing the subtree found there. A shape error
//! drops only the subtree it was raised for.

use crate::api::logs::{log_debug, log_info_indent, log_warning};
use crate::error::{ConfigResult, ShapeError, TransformError, TransformResult};
use crate::models::{path_to_string, DimensionPath};
use crate::tree::{cartesian_product, DataTree};

use super::registry::TransformRegistry;
use super::{TransformStep, Transformer};

/// A subtree removed because its shape did not suit a transformer.
#[derive(Debug)]
pub struct PathFailure {
    pub transform: String,
    pub path: DimensionPath,
    pub error: ShapeError,
}

impl PathFailure {
    pub fn message(&self) -> String {
        format!("{}: {}", self.transform, self.error)
    }
}

/// A transformed tree and the subtrees dropped on the way.
#[derive(Debug)]
pub struct Transformed {
    pub tree: DataTree,
    pub failures: Vec<PathFailure>,
}

/// An ordered sequence of transformers.
#[derive(Default)]
pub struct TransformChain {
    transformers: Vec<Box<dyn Transformer>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every step through the registry. Fails on the first unknown
    /// keyword or invalid option set.
    pub fn from_steps(steps: &[TransformStep], registry: &TransformRegistry) -> ConfigResult<Self> {
        let transformers = steps
            .iter()
            .map(|step| registry.build(step))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { transformers })
    }

    pub fn push(&mut self, transformer: Box<dyn Transformer>) {
        self.transformers.push(transformer);
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Apply every transformer in order.
    pub fn apply(&self, tree: DataTree) -> TransformResult<Transformed> {
        let mut tree = tree;
        let mut failures = Vec::new();
        for transformer in &self.transformers {
            log_info_indent(format!("Applying transform '{}'", transformer.name()), 1);
            let step = apply_transformer(transformer.as_ref(), tree)?;
            tree = step.tree;
            failures.extend(step.failures);
        }
        Ok(Transformed { tree, failures })
    }
}

/// Apply one transformer to every subtree at its declared depth.
///
/// Paths of the product that do not exist in the irregular tree are
/// skipped. A level count at or above the tree depth hands over the root.
/// Shape errors remove the offending subtree and are reported in
/// [`Transformed::failures`]; any other error aborts the transformer.
pub fn apply_transformer(transformer: &dyn Transformer, mut tree: DataTree) -> TransformResult<Transformed> {
    let levels = tree.get_paths();
    let visit = levels.len().saturating_sub(transformer.levels());

    let mut replaced = 0;
    let mut removed = 0;
    let mut failures = Vec::new();
    for path in cartesian_product(&levels[..visit]) {
        let Some(slot) = tree.get_leaf_mut(&path) else {
            continue;
        };
        let subtree = std::mem::take(slot);

        match transformer.apply(subtree, &path) {
            Ok(Some(node)) => {
                if let Some(slot) = tree.get_leaf_mut(&path) {
                    *slot = node;
                }
                replaced += 1;
            }
            Ok(None) => {
                log_debug(format!(
                    "{}: no result for '{}', removing",
                    transformer.name(),
                    path_to_string(&path)
                ));
                tree.remove_leaf(&path);
                removed += 1;
            }
            Err(TransformError::Shape(error)) => {
                log_warning(format!(
                    "{}: '{}' dropped: {}",
                    transformer.name(),
                    path_to_string(&path),
                    error
                ));
                tree.remove_leaf(&path);
                failures.push(PathFailure {
                    transform: transformer.name().to_string(),
                    path,
                    error,
                });
            }
            Err(e) => return Err(e),
        }
    }
    if !failures.is_empty() {
        tree.remove_empty_branches();
    }

    log_debug(format!(
        "{}: {} subtrees replaced, {} removed, {} failed",
        transformer.name(),
        replaced,
        removed,
        failures.len()
    ));
    Ok(Transformed { tree, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Node;
    use serde_json::json;

    /// Doubles numeric leaves and drops negative ones.
    struct Doubler;

    impl Transformer for Doubler {
        fn name(&self) -> &str {
            "double"
        }

        fn levels(&self) -> usize {
            0
        }

        fn apply(&self, subtree: Node, _path: &[String]) -> TransformResult<Option<Node>> {
            let value = subtree.as_scalar().and_then(|s| s.as_f64()).unwrap_or(0.0);
            if value < 0.0 {
                Ok(None)
            } else {
                Ok(Some(Node::from(value * 2.0)))
            }
        }
    }

    /// Counts the children of whatever it receives.
    struct Counter(usize);

    impl Transformer for Counter {
        fn name(&self) -> &str {
            "count"
        }

        fn levels(&self) -> usize {
            self.0
        }

        fn apply(&self, subtree: Node, _path: &[String]) -> TransformResult<Option<Node>> {
            let n = subtree.as_mapping().map(|m| m.len()).unwrap_or(0);
            Ok(Some(Node::from(n as f64)))
        }
    }

    /// Rejects series of odd length.
    struct EvenOnly;

    impl Transformer for EvenOnly {
        fn name(&self) -> &str {
            "even"
        }

        fn levels(&self) -> usize {
            0
        }

        fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
            match subtree.as_series() {
                Some(series) if series.len() % 2 == 1 => Err(ShapeError::LengthMismatch {
                    left: path_to_string(path),
                    right: "pair".to_string(),
                    left_len: series.len(),
                    right_len: 2,
                }
                .into()),
                Some(_) => Ok(Some(subtree)),
                None => Err(TransformError::NoCandidateField {
                    fields: vec!["series".to_string()],
                    path: path_to_string(path),
                }),
            }
        }
    }

    fn tree(value: serde_json::Value) -> DataTree {
        DataTree::from_node(Node::from(value))
    }

    #[test]
    fn test_leaf_transform_replaces_and_removes() {
        let t = tree(json!({"t1": {"a": 1, "b": -1}, "t2": {"a": 3}}));
        let out = apply_transformer(&Doubler, t).unwrap().tree;
        assert_eq!(out, tree(json!({"t1": {"a": 2}, "t2": {"a": 6}})));
    }

    #[test]
    fn test_order_is_preserved() {
        let t = tree(json!({"t1": {"a": 1, "b": 2, "c": 3}}));
        let out = apply_transformer(&Doubler, t).unwrap().tree;
        assert_eq!(out.get_paths()[1], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_irregular_paths_are_skipped() {
        let t = tree(json!({"t1": {"s1": {"x": 1}}, "t2": {"s2": {"x": 1, "y": 2}}}));
        let out = apply_transformer(&Counter(1), t).unwrap().tree;
        assert_eq!(out, tree(json!({"t1": {"s1": 1}, "t2": {"s2": 2}})));
    }

    #[test]
    fn test_levels_above_depth_receive_root() {
        let t = tree(json!({"t1": {"a": 1}, "t2": {"a": 2}}));
        let out = apply_transformer(&Counter(5), t).unwrap().tree;
        assert_eq!(out.root(), &Node::from(2.0));
    }

    #[test]
    fn test_chain_applies_in_order() {
        let mut chain = TransformChain::new();
        chain.push(Box::new(Doubler));
        chain.push(Box::new(Counter(1)));
        assert_eq!(chain.names(), vec!["double", "count"]);

        let out = chain.apply(tree(json!({"t1": {"a": 1, "b": -5}}))).unwrap();
        assert_eq!(out.tree, tree(json!({"t1": 1})));
        assert!(out.failures.is_empty());
    }

    #[test]
    fn test_shape_errors_drop_only_their_path() {
        let t = tree(json!({"t1": {"v": [1, 2]}, "t2": {"v": [1, 2, 3]}}));
        let out = apply_transformer(&EvenOnly, t).unwrap();

        assert_eq!(out.tree, tree(json!({"t1": {"v": [1, 2]}})));
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].path, vec!["t2", "v"]);
        assert!(out.failures[0].message().starts_with("even: "));
    }

    #[test]
    fn test_other_errors_abort_the_transform() {
        let t = tree(json!({"t1": {"v": [1, 2]}, "t2": {"v": 3}}));
        assert!(matches!(
            apply_transformer(&EvenOnly, t),
            Err(TransformError::NoCandidateField { .. })
        ));
    }
}
