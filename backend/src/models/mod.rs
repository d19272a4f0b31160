//! Domain models for the report pipeline.
//!
//! - [`Scalar`] - A single leaf value (null, bool, number or text)
//! - [`Node`] - A tree node: scalar leaf, series leaf or mapping branch
//! - [`Branch`] - Ordered label -> node map used for mappings
//! - [`DimensionPath`] - Ordered tuple of labels addressing a node
//!
//! Data sources hand back [`Node`] values, so downstream code matches on a
//! closed set of shapes instead of inspecting raw JSON.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Ordered tuple of labels addressing a node in a tree.
pub type DimensionPath = Vec<String>;

/// Ordered map from label to child node. Insertion order is significant.
pub type Branch = IndexMap<String, Node>;

/// Join a path for display and for cache keys.
pub fn path_to_string(path: &[String]) -> String {
    path.join("/")
}

// =============================================================================
// Scalar
// =============================================================================

/// A single leaf value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value. Text is parsed; null has no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
            Scalar::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => number_to_json(*n),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Integral values serialize without a fractional part.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => match number_to_json(*n) {
                Value::Number(num) => write!(f, "{}", num),
                _ => write!(f, "{}", n),
            },
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Scalar::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a scalar value"))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

// =============================================================================
// Node
// =============================================================================

/// A node of a hierarchical tree.
///
/// Mappings are branches; scalars and series are leaves. Serializes to and
/// from plain JSON: objects become mappings, arrays of scalars become
/// series, and arrays containing containers become mappings keyed by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Node {
    Scalar(Scalar),
    Series(Vec<Scalar>),
    Mapping(Branch),
}

impl Default for Node {
    fn default() -> Self {
        Node::Mapping(Branch::new())
    }
}

impl Node {
    /// An empty mapping.
    pub fn mapping() -> Self {
        Node::Mapping(Branch::new())
    }

    /// Build a mapping from label/value pairs, preserving order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Node>,
    {
        Node::Mapping(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// A numeric series.
    pub fn series(values: impl IntoIterator<Item = f64>) -> Self {
        Node::Series(values.into_iter().map(Scalar::Number).collect())
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Node::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&Branch> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Branch> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[Scalar]> {
        match self {
            Node::Series(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric values of a series, `None` entries for nulls and non-numbers.
    pub fn numeric_series(&self) -> Option<Vec<Option<f64>>> {
        self.as_series()
            .map(|values| values.iter().map(Scalar::as_f64).collect())
    }

    /// Child of a mapping by label.
    pub fn child(&self, label: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(label))
    }

    /// True for empty mappings and empty series.
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Mapping(m) => m.is_empty(),
            Node::Series(s) => s.is_empty(),
            Node::Scalar(_) => false,
        }
    }

    /// Short description of the node's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Series(_) => "series",
            Node::Mapping(_) => "mapping",
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Node::Scalar(s) => s.to_json(),
            Node::Series(values) => Value::Array(values.iter().map(Scalar::to_json).collect()),
            Node::Mapping(map) => {
                let obj: Map<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                Value::Object(obj)
            }
        }
    }

    /// Convert from a JSON value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(obj) => Node::Mapping(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                let scalars: Option<Vec<Scalar>> = items.iter().map(Scalar::from_json).collect();
                match scalars {
                    Some(values) => Node::Series(values),
                    None => Node::Mapping(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, v)| (i.to_string(), Node::from_json(v)))
                            .collect(),
                    ),
                }
            }
            other => Node::Scalar(Scalar::from_json(other).unwrap_or_default()),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::from_json(&value)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        node.to_json()
    }
}

impl From<Scalar> for Node {
    fn from(value: Scalar) -> Self {
        Node::Scalar(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Scalar(Scalar::Number(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Scalar(Scalar::from(value))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Scalar(Scalar::from(value))
    }
}

impl From<Vec<Scalar>> for Node {
    fn from(values: Vec<Scalar>) -> Self {
        Node::Series(values)
    }
}

impl From<Branch> for Node {
    fn from(map: Branch) -> Self {
        Node::Mapping(map)
    }
}
