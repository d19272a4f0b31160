//! Built-in transformers
//!
//! Each transformer decodes its options from the JSON object of a
//! [`super::TransformStep`] and declares the depth it works at.

use serde::{Deserialize, Serialize};

use crate::api::logs::log_debug;
use crate::error::{ShapeError, TransformError, TransformResult};
use crate::models::{path_to_string, Branch, Node, Scalar};

use super::histogram::finite_values;
use super::Transformer;

// =============================================================================
// filter
// =============================================================================

/// Keep only the named fields of every leaf mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterFields {
    pub fields: Vec<String>,
}

impl Transformer for FilterFields {
    fn name(&self) -> &str {
        "filter"
    }

    fn levels(&self) -> usize {
        1
    }

    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
        let Node::Mapping(mut map) = subtree else {
            log_debug(format!("filter: '{}' is not a mapping, kept", path_to_string(path)));
            return Ok(Some(subtree));
        };

        map.retain(|label, _| self.fields.contains(label));
        if map.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Node::Mapping(map)))
        }
    }
}

// =============================================================================
// select
// =============================================================================

/// Replace every child by the first of `fields` it contains.
///
/// Children without any candidate get `default`. It is an error when no
/// child of the subtree has any candidate at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectField {
    pub fields: Vec<String>,
    #[serde(default)]
    pub default: Scalar,
}

impl Transformer for SelectField {
    fn name(&self) -> &str {
        "select"
    }

    fn levels(&self) -> usize {
        2
    }

    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
        let Node::Mapping(children) = subtree else {
            return Ok(Some(subtree));
        };

        let mut found = 0;
        let mut out = Branch::with_capacity(children.len());
        for (label, child) in children {
            let selected = self
                .fields
                .iter()
                .find_map(|field| child.child(field))
                .cloned();
            match selected {
                Some(value) => {
                    found += 1;
                    out.insert(label, value);
                }
                None => {
                    out.insert(label, Node::Scalar(self.default.clone()));
                }
            }
        }

        if found == 0 {
            return Err(TransformError::NoCandidateField {
                fields: self.fields.clone(),
                path: path_to_string(path),
            });
        }
        Ok(Some(Node::Mapping(out)))
    }
}

// =============================================================================
// combine
// =============================================================================

/// Pair every two siblings on a shared field.
///
/// For siblings `a` and `b` the output holds `"a x b": {a: .., b: ..}`. The
/// field is the first candidate present in `a`; pairs where `b` lacks it
/// are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combine {
    pub fields: Vec<String>,
}

impl Combine {
    fn length(node: &Node, path: &[String], label: &str) -> TransformResult<usize> {
        match node {
            Node::Scalar(_) => Ok(1),
            Node::Series(values) => Ok(values.len()),
            Node::Mapping(_) => Err(ShapeError::UnexpectedValue {
                path: format!("{}/{}", path_to_string(path), label),
                expected: "scalar or series".to_string(),
            }
            .into()),
        }
    }
}

impl Transformer for Combine {
    fn name(&self) -> &str {
        "combine"
    }

    fn levels(&self) -> usize {
        2
    }

    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
        let Node::Mapping(children) = subtree else {
            return Ok(Some(subtree));
        };

        let entries: Vec<(&String, &Node)> = children.iter().collect();
        let mut out = Branch::new();
        for (i, (n1, d1)) in entries.iter().enumerate() {
            for (n2, d2) in &entries[i + 1..] {
                let Some((field, v1)) = self
                    .fields
                    .iter()
                    .find_map(|f| d1.child(f).map(|v| (f, v)))
                else {
                    return Err(TransformError::NoCandidateField {
                        fields: self.fields.clone(),
                        path: format!("{}/{}", path_to_string(path), n1),
                    });
                };
                let Some(v2) = d2.child(field) else {
                    log_debug(format!("combine: '{}' has no field '{}', skipped", n2, field));
                    continue;
                };

                let left_len = Self::length(v1, path, n1)?;
                let right_len = Self::length(v2, path, n2)?;
                if left_len != right_len {
                    return Err(ShapeError::LengthMismatch {
                        left: n1.to_string(),
                        right: n2.to_string(),
                        left_len,
                        right_len,
                    }
                    .into());
                }

                out.insert(
                    format!("{} x {}", n1, n2),
                    Node::from_pairs([(n1.as_str(), v1.clone()), (n2.as_str(), v2.clone())]),
                );
            }
        }

        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Node::Mapping(out)))
        }
    }
}

// =============================================================================
// stats
// =============================================================================

/// Summary statistics of a numeric series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {}

impl Stats {
    /// Linear interpolation between closest ranks.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        let rank = p * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
    }

    pub fn summarize(values: &[f64]) -> Option<Node> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let sum: f64 = sorted.iter().sum();
        let mean = sum / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Node::from_pairs([
            ("nval", n),
            ("min", sorted[0]),
            ("max", sorted[sorted.len() - 1]),
            ("mean", mean),
            ("median", Self::percentile(&sorted, 0.5)),
            ("stddev", variance.sqrt()),
            ("sum", sum),
            ("q1", Self::percentile(&sorted, 0.25)),
            ("q3", Self::percentile(&sorted, 0.75)),
        ]))
    }
}

impl Transformer for Stats {
    fn name(&self) -> &str {
        "stats"
    }

    fn levels(&self) -> usize {
        0
    }

    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
        let Some(values) = subtree.numeric_series() else {
            log_debug(format!("stats: '{}' is not a series, kept", path_to_string(path)));
            return Ok(Some(subtree));
        };
        Ok(Self::summarize(&finite_values(values)))
    }
}
