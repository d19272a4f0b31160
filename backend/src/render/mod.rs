//! Render sinks and rendered blocks.
//!
//! A [`RenderSink`] receives one (sub)tree per render call together with
//! the path it was split off at, and returns renderable [`Block`]s. The
//! dispatcher makes sure the tree is at least [`RenderSink::required_depth`]
//! levels deep.

pub mod export;

use serde::{Deserialize, Serialize};

use crate::error::{RenderResult, Stage};
use crate::models::{path_to_string, Scalar};
use crate::table::{apply_operators, build_matrix, tree_to_table, Matrix, MatrixOperator, Table};
use crate::tree::DataTree;

pub use export::{blocks_to_csv, matrix_to_csv, table_to_csv};

/// One rendered output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Matrix { title: String, matrix: Matrix },
    Table { title: String, table: Table },
    Text { title: String, text: String },
    /// A stage failed; carries the stage and the dimension path (if any).
    Error {
        stage: Stage,
        path: String,
        message: String,
    },
}

impl Block {
    pub fn error(stage: Stage, path: &[String], message: impl Into<String>) -> Self {
        Block::Error {
            stage,
            path: path_to_string(path),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Block::Error { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            Block::Matrix { title, .. } | Block::Table { title, .. } | Block::Text { title, .. } => title,
            Block::Error { path, .. } => path,
        }
    }
}

/// Consumer of the final tree.
pub trait RenderSink: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum number of levels the tree handed to [`RenderSink::render`] has.
    fn required_depth(&self) -> usize;

    fn render(&self, tree: &DataTree, path: &[String]) -> RenderResult<Vec<Block>>;
}

// =============================================================================
// Matrix renderer
// =============================================================================

/// Projects the tree into a numeric matrix and applies operators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixRenderer {
    /// Field picked from the deepest level.
    #[serde(default)]
    pub field: Option<String>,
    /// Value of missing cells.
    #[serde(default)]
    pub missing: f64,
    #[serde(default)]
    pub operators: Vec<MatrixOperator>,
}

impl MatrixRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn with_operators(mut self, operators: Vec<MatrixOperator>) -> Self {
        self.operators = operators;
        self
    }
}

impl RenderSink for MatrixRenderer {
    fn name(&self) -> &str {
        "matrix"
    }

    fn required_depth(&self) -> usize {
        2
    }

    fn render(&self, tree: &DataTree, path: &[String]) -> RenderResult<Vec<Block>> {
        let matrix = build_matrix(tree, self.field.as_deref(), self.missing)?;
        let matrix = apply_operators(matrix, &self.operators)?;
        Ok(vec![Block::Matrix {
            title: path_to_string(path),
            matrix,
        }])
    }
}

// =============================================================================
// Table renderer
// =============================================================================

/// Projects the tree into a display table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRenderer {
    /// Value of missing cells.
    #[serde(default)]
    pub missing: Scalar,
}

impl RenderSink for TableRenderer {
    fn name(&self) -> &str {
        "table"
    }

    fn required_depth(&self) -> usize {
        2
    }

    fn render(&self, tree: &DataTree, path: &[String]) -> RenderResult<Vec<Block>> {
        let table = tree_to_table(tree, &self.missing)?;
        Ok(vec![Block::Table {
            title: path_to_string(path),
            table,
        }])
    }
}
