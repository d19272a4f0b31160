//! Data source capability.
//!
//! A [`DataSource`] produces the raw leaf data for one dimension path. The
//! dispatcher introspects it for its dimension labels, calls it once per
//! path and caches the result under the source's identity.
//!
//! Two adapters are provided:
//!
//! - [`FnSource`] wraps a closure, optionally with declared tracks/slices
//! - [`DocumentSource`] serves a JSON document already nested by track and slice

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{SourceError, SourceResult};
use crate::models::{DimensionPath, Node};
use crate::tree::DataTree;

/// Producer of nested data keyed by dimension labels.
pub trait DataSource: Send + Sync {
    /// Identity used to scope the persistent cache.
    ///
    /// Defaults to the implementing type, so two instances of the same
    /// source share cached values.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Produce data for `path`. `Ok(None)` means "no data for this path".
    fn call(&self, path: &[String], options: Option<&str>) -> SourceResult<Option<Node>>;

    /// Explicit label lists, one per dimension level.
    fn paths(&self) -> Vec<Vec<String>> {
        Vec::new()
    }

    /// Track labels (first dimension).
    fn tracks(&self) -> Vec<String> {
        Vec::new()
    }

    /// Slice labels (second dimension).
    fn slices(&self) -> Vec<String> {
        Vec::new()
    }

    /// Sources that take no dimension arguments are called once.
    fn dimensionless(&self) -> bool {
        false
    }

    /// Non-cacheable sources bypass the cache for reads and writes.
    fn cacheable(&self) -> bool {
        true
    }
}

/// Dimension label lists declared by a source.
///
/// Explicit paths win; otherwise tracks and slices, skipping empty ones.
pub fn declared_levels(source: &dyn DataSource) -> Vec<Vec<String>> {
    let explicit = source.paths();
    if !explicit.is_empty() {
        return explicit;
    }
    [source.tracks(), source.slices()]
        .into_iter()
        .filter(|labels| !labels.is_empty())
        .collect()
}

// =============================================================================
// Closure adapter
// =============================================================================

/// Signature of closures wrapped by [`FnSource`].
pub type SourceFn = dyn Fn(&[String], Option<&str>) -> SourceResult<Option<Node>> + Send + Sync;

/// A data source backed by a closure.
pub struct FnSource {
    name: String,
    tracks: Vec<String>,
    slices: Vec<String>,
    dimensionless: bool,
    cacheable: bool,
    func: Box<SourceFn>,
}

impl FnSource {
    /// A source called once per (track, slice) path.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[String], Option<&str>) -> SourceResult<Option<Node>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            tracks: Vec::new(),
            slices: Vec::new(),
            dimensionless: false,
            cacheable: true,
            func: Box::new(func),
        }
    }

    /// A source called once with no dimension arguments.
    pub fn dimensionless<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[String], Option<&str>) -> SourceResult<Option<Node>> + Send + Sync + 'static,
    {
        let mut source = Self::new(name, func);
        source.dimensionless = true;
        source
    }

    pub fn with_tracks<S: Into<String>>(mut self, tracks: impl IntoIterator<Item = S>) -> Self {
        self.tracks = tracks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_slices<S: Into<String>>(mut self, slices: impl IntoIterator<Item = S>) -> Self {
        self.slices = slices.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the source as non-cacheable.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

impl DataSource for FnSource {
    fn identity(&self) -> String {
        format!("fn:{}", self.name)
    }

    fn call(&self, path: &[String], options: Option<&str>) -> SourceResult<Option<Node>> {
        (self.func)(path, options)
    }

    fn tracks(&self) -> Vec<String> {
        self.tracks.clone()
    }

    fn slices(&self) -> Vec<String> {
        self.slices.clone()
    }

    fn dimensionless(&self) -> bool {
        self.dimensionless
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }
}

// =============================================================================
// Document adapter
// =============================================================================

/// On-disk layout of a source document.
///
/// ```json
/// {
///   "name": "expression",
///   "slices": ["liver", "brain"],
///   "data": { "wt": { "liver": {"mean": 1.5}, "brain": {"mean": 2.0} } }
/// }
/// ```
///
/// Tracks default to the first-level labels of `data`. Slices are only
/// used when listed. A `data` value that is not a mapping is served as a
/// dimensionless result.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDocument {
    #[serde(default = "default_document_name")]
    pub name: String,
    #[serde(default)]
    pub tracks: Option<Vec<String>>,
    #[serde(default)]
    pub slices: Option<Vec<String>>,
    #[serde(default = "default_cacheable")]
    pub cache: bool,
    pub data: Node,
}

fn default_document_name() -> String {
    "document".to_string()
}

fn default_cacheable() -> bool {
    true
}

/// A data source serving a [`SourceDocument`].
///
/// The identity carries a content hash of `data`, so documents sharing a
/// name never share cache entries.
pub struct DocumentSource {
    document: SourceDocument,
    tree: DataTree,
    fingerprint: String,
}

impl DocumentSource {
    pub fn new(document: SourceDocument) -> Self {
        let tree = DataTree::from_node(document.data.clone());
        let hash = blake3::hash(document.data.to_json().to_string().as_bytes());
        let fingerprint = hash.to_hex()[..16].to_string();
        Self {
            document,
            tree,
            fingerprint,
        }
    }

    /// Read a document from a JSON file.
    pub fn from_file(path: &Path) -> SourceResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> SourceResult<Self> {
        let document: SourceDocument = serde_json::from_str(json)?;
        Ok(Self::new(document))
    }

    pub fn from_value(value: Value) -> SourceResult<Self> {
        let document: SourceDocument = serde_json::from_value(value)?;
        Ok(Self::new(document))
    }

    pub fn name(&self) -> &str {
        &self.document.name
    }

    /// Label sets of the served data.
    pub fn data_paths(&self) -> Vec<Vec<String>> {
        self.tree.get_paths()
    }
}

impl DataSource for DocumentSource {
    fn identity(&self) -> String {
        format!("document:{}:{}", self.document.name, self.fingerprint)
    }

    fn call(&self, path: &[String], _options: Option<&str>) -> SourceResult<Option<Node>> {
        if self.dimensionless() {
            return Ok(Some(self.tree.root().clone()));
        }
        let path: DimensionPath = path.to_vec();
        Ok(self.tree.get_leaf(&path).cloned())
    }

    fn tracks(&self) -> Vec<String> {
        match &self.document.tracks {
            Some(tracks) => tracks.clone(),
            None => self
                .tree
                .root()
                .as_mapping()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn slices(&self) -> Vec<String> {
        self.document.slices.clone().unwrap_or_default()
    }

    fn dimensionless(&self) -> bool {
        self.tree.root().is_leaf()
    }

    fn cacheable(&self) -> bool {
        self.document.cache
    }
}

/// Convenience for sources that fail with a message.
pub fn source_failure(message: impl Into<String>) -> SourceError {
    SourceError::failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counts;

    impl DataSource for Counts {
        fn call(&self, path: &[String], _options: Option<&str>) -> SourceResult<Option<Node>> {
            Ok(Some(Node::from(path.len() as f64)))
        }

        fn tracks(&self) -> Vec<String> {
            vec!["t1".into()]
        }
    }

    #[test]
    fn test_default_identity_is_type_name() {
        assert!(Counts.identity().ends_with("Counts"));
    }

    #[test]
    fn test_declared_levels() {
        assert_eq!(declared_levels(&Counts), vec![vec!["t1".to_string()]]);

        let source = FnSource::new("f", |_, _| Ok(None))
            .with_tracks(["a", "b"])
            .with_slices(["x"]);
        assert_eq!(declared_levels(&source).len(), 2);
    }

    #[test]
    fn test_document_identity_follows_content() {
        let a = DocumentSource::from_value(json!({"data": {"t1": {"v": 1}}})).unwrap();
        let b = DocumentSource::from_value(json!({"data": {"t1": {"v": 2}}})).unwrap();
        let a_again = DocumentSource::from_value(json!({"data": {"t1": {"v": 1}}})).unwrap();

        assert_eq!(a.name(), b.name());
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a_again.identity());
    }

    #[test]
    fn test_document_source() {
        let source = DocumentSource::from_value(json!({
            "name": "expr",
            "slices": ["liver"],
            "data": {"wt": {"liver": {"mean": 1.5}}, "ko": {"liver": {"mean": 2.5}}}
        }))
        .unwrap();

        assert!(source.identity().starts_with("document:expr:"));
        assert_eq!(source.tracks(), vec!["wt", "ko"]);
        assert_eq!(source.slices(), vec!["liver"]);
        assert!(!source.dimensionless());

        let value = source.call(&["ko".into(), "liver".into()], None).unwrap();
        assert_eq!(value.unwrap().child("mean"), Some(&Node::from(2.5)));
        assert_eq!(source.call(&["ko".into(), "brain".into()], None).unwrap(), None);
    }

    #[test]
    fn test_document_scalar_data_is_dimensionless() {
        let source = DocumentSource::from_json(r#"{"data": [1, 2, 3]}"#).unwrap();
        assert!(source.dimensionless());
        assert_eq!(source.call(&[], None).unwrap(), Some(Node::series([1.0, 2.0, 3.0])));
    }
}
