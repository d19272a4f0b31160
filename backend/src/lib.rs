//! # Trackreport - tree-shaped report pipeline
//!
//! Trackreport collects nested results from a data source (one call per
//! track/slice combination), reshapes them as a tree and projects the tree
//! into matrices and tables for reporting.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Data source │────▶│ Path cache  │────▶│  Transform  │────▶│   Render    │
//! │ track/slice │     │  (on disk)  │     │ (tree→tree) │     │ matrix/table│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trackreport::{Dispatcher, DocumentSource, MatrixRenderer, PipelineConfig, TransformRegistry};
//!
//! let source = DocumentSource::from_file("results.json".as_ref())?;
//! let dispatcher = Dispatcher::new(Box::new(source), ".trackreport/cache");
//! let outcome = dispatcher.run(
//!     &PipelineConfig::default(),
//!     &TransformRegistry::builtin(),
//!     &MatrixRenderer::new().with_field("mean"),
//! );
//! println!("{} blocks", outcome.blocks.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types and pipeline stages
//! - [`models`] - Scalars, nodes and dimension paths
//! - [`tree`] - Path-addressable nested tree
//! - [`cache`] - Persistent per-path cache
//! - [`source`] - Data source trait and adapters
//! - [`transform`] - Tree transforms and the transform chain
//! - [`table`] - Matrix and table projection, matrix operators
//! - [`render`] - Render sinks and CSV export
//! - [`pipeline`] - Options and the stage dispatcher
//! - [`api`] - HTTP API server and log broadcasting

// Core modules
pub mod error;
pub mod models;
pub mod tree;

// Collection
pub mod cache;
pub mod source;

// Reshaping
pub mod table;
pub mod transform;

// Output
pub mod render;

// Orchestration
pub mod pipeline;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CacheError, ConfigError, PipelineError, RenderError, ShapeError, SourceError, Stage, TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{path_to_string, Branch, DimensionPath, Node, Scalar};
pub use tree::{cartesian_product, DataTree};

// =============================================================================
// Re-exports - Collection
// =============================================================================

pub use cache::{PathCache, DEFAULT_CACHE_DIR};
pub use source::{DataSource, DocumentSource, FnSource, SourceDocument};

// =============================================================================
// Re-exports - Transforms
// =============================================================================

pub use transform::{transforms_description, TransformChain, TransformRegistry, TransformStep, Transformer};

// =============================================================================
// Re-exports - Tables
// =============================================================================

pub use table::{build_matrix, operators_description, parse_operators, tree_to_table, Header, Matrix, MatrixOperator, Table};

// =============================================================================
// Re-exports - Rendering
// =============================================================================

pub use render::{blocks_to_csv, Block, MatrixRenderer, RenderSink, TableRenderer};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{parse_arguments, Dispatcher, GroupBy, PipelineConfig, PipelineOptions, RunOutcome, RunStatus};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, RendererConfig, RunRequest, RunResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
