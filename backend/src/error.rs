//! Error types for the report pipeline.
//!
//! The hierarchy mirrors the pipeline's failure policy:
//!
//! - [`ConfigError`] - Bad option combinations, fatal for the stage that sees them
//! - [`ShapeError`] - Tree or matrix dimensions that do not fit, fatal per path
//! - [`SourceError`] - The external data source failed for one path
//! - [`CacheError`] - Store unavailable or corrupt, never leaves the cache module
//! - [`TransformError`] - Failures raised by the transform chain
//! - [`RenderError`] - Failures raised while projecting a tree for a sink
//! - [`PipelineError`] - Top-level wrapper used by the dispatcher
//!
//! Only the dispatcher turns these into user-visible error blocks.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Pipeline stages
// =============================================================================

/// The stages of one pipeline invocation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ParseArguments,
    Collect,
    Transform,
    Restrict,
    Exclude,
    Prune,
    Group,
    Render,
}

impl Stage {
    /// Kebab-case stage name as shown in error blocks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParseArguments => "parse-arguments",
            Stage::Collect => "collect",
            Stage::Transform => "transform",
            Stage::Restrict => "restrict",
            Stage::Exclude => "exclude",
            Stage::Prune => "prune",
            Stage::Group => "group",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid pipeline options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown `groupby` value.
    #[error("Unknown groupby '{0}' (expected track, slice, all or none)")]
    InvalidGroupBy(String),

    /// Unknown transform keyword.
    #[error("Unknown transform '{0}'")]
    UnknownTransform(String),

    /// Transform options could not be decoded.
    #[error("Invalid options for transform '{name}': {message}")]
    InvalidTransformOptions { name: String, message: String },

    /// Malformed `r(...)` pattern.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Unknown matrix operator keyword.
    #[error("Unknown matrix operator '{0}'")]
    UnknownOperator(String),

    /// Source declares more dimension levels than supported.
    #[error("Too many dimension levels: {found} (maximum {max})")]
    TooManyLevels { found: usize, max: usize },

    /// Generic invalid option.
    #[error("Invalid option '{option}': {message}")]
    InvalidOption { option: String, message: String },
}

// =============================================================================
// Shape Errors
// =============================================================================

/// Tree or matrix dimensions are inconsistent.
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Tree is shallower than an operation needs.
    #[error("Expected at least {expected} levels, got {found}")]
    TooShallow { expected: usize, found: usize },

    /// Operation needs a square matrix.
    #[error("Matrix is not square ({rows}x{cols}) - can not be symmetrized")]
    NotSquare { rows: usize, cols: usize },

    /// Multi-level row whose columns disagree in length.
    #[error("Multi-level row '{row}' has columns of unequal length: {lengths:?}")]
    RaggedRow { row: String, lengths: Vec<usize> },

    /// A cell that must hold a scalar holds something else.
    #[error("Cell ({row}, {col}) is not numeric: {found}")]
    NonScalarCell { row: String, col: String, found: String },

    /// Two series that must be combined differ in length.
    #[error("Length of '{left}' and '{right}' not equal: {left_len} != {right_len}")]
    LengthMismatch {
        left: String,
        right: String,
        left_len: usize,
        right_len: usize,
    },

    /// A leaf has the wrong kind for an operation.
    #[error("Unexpected value at '{path}': expected {expected}")]
    UnexpectedValue { path: String, expected: String },
}

// =============================================================================
// Source Errors
// =============================================================================

/// Raised by a [`crate::source::DataSource`] for one dimension path.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source raised while producing data.
    #[error("Data source failed: {0}")]
    Failed(String),

    /// Source document could not be read.
    #[error("Failed to read source: {0}")]
    IoError(#[from] std::io::Error),

    /// Source document is not valid JSON.
    #[error("Invalid source document: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SourceError {
    pub fn failed(message: impl Into<String>) -> Self {
        SourceError::Failed(message.into())
    }
}

// =============================================================================
// Cache Errors
// =============================================================================

/// Errors from the persistent store behind [`crate::cache::PathCache`].
///
/// These never reach pipeline callers: the cache degrades to a miss or a
/// dropped write instead.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Store directory could not be opened or written.
    #[error("Cache IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Entry could not be encoded or decoded.
    #[error("Cache JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Temporary file could not be moved into place.
    #[error("Failed to persist cache entry: {0}")]
    PersistError(String),

    /// Stored record belongs to a different key.
    #[error("Cache record key mismatch: expected '{expected}', found '{found}'")]
    KeyMismatch { expected: String, found: String },
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Errors raised by the transform chain.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Configuration mistake detected while transforming.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shape problem in the subtree being transformed.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// None of the candidate fields exist anywhere in the subtree.
    #[error("Could not find any of the fields {fields:?} in '{path}'")]
    NoCandidateField { fields: Vec<String>, path: String },
}

// =============================================================================
// Render Errors
// =============================================================================

/// Errors raised while projecting a tree for a render sink.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Projection shape problem.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// Sink misconfiguration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sink-specific failure.
    #[error("Render failed: {0}")]
    Failed(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors seen by the dispatcher.
///
/// Each stage returns one of these; the dispatcher converts it into an
/// error block annotated with the stage name.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for option parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for projections and matrix operators.
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Result type for data source calls.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for cache store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for transformers.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for render sinks.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ShapeError -> TransformError -> PipelineError
        let shape = ShapeError::NotSquare { rows: 2, cols: 3 };
        let transform: TransformError = shape.into();
        let pipeline: PipelineError = transform.into();
        assert!(pipeline.to_string().contains("2x3"));

        // ConfigError -> PipelineError
        let config = ConfigError::UnknownTransform("frobnicate".into());
        let pipeline: PipelineError = config.into();
        assert!(pipeline.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ParseArguments.to_string(), "parse-arguments");
        assert_eq!(Stage::Render.as_str(), "render");
        let json = serde_json::to_string(&Stage::Collect).unwrap();
        assert_eq!(json, "\"collect\"");
    }

    #[test]
    fn test_length_mismatch_format() {
        let err = ShapeError::LengthMismatch {
            left: "a".into(),
            right: "b".into(),
            left_len: 3,
            right_len: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 != 2"));
    }
}
