//! Tabular projection of hierarchical trees.
//!
//! - [`build_matrix`] builds a strictly numeric row/column matrix
//! - [`tree_to_table`] builds a ragged-aware display table
//! - [`MatrixOperator`] reshapes a matrix (normalize, symmetrize, sort, ...)
//!
//! Trees deeper than a projection needs are flattened: the extra top levels
//! become multi-level row headers.

pub mod correspondence;
pub mod operators;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ShapeError, ShapeResult};
use crate::models::{Node, Scalar};
use crate::tree::DataTree;

pub use operators::{apply_operators, natural_cmp, operators_description, parse_operators, MatrixOperator};

/// Separator used when displaying multi-level headers.
pub const HEADER_SEPARATOR: &str = "/";

// =============================================================================
// Headers
// =============================================================================

/// A row or column header: one label, or several for flattened levels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Header(Vec<String>);

impl Header {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn is_multi_level(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(HEADER_SEPARATOR))
    }
}

impl From<&str> for Header {
    fn from(label: &str) -> Self {
        Self(vec![label.to_string()])
    }
}

impl From<String> for Header {
    fn from(label: String) -> Self {
        Self(vec![label])
    }
}

impl From<Vec<String>> for Header {
    fn from(labels: Vec<String>) -> Self {
        Self(labels)
    }
}

impl Serialize for Header {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Header {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Header(s.split(HEADER_SEPARATOR).map(String::from).collect()))
    }
}

// =============================================================================
// Matrix
// =============================================================================

/// A rectangular numeric matrix with row and column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub data: Vec<Vec<f64>>,
    pub row_headers: Vec<Header>,
    pub col_headers: Vec<Header>,
}

impl Matrix {
    /// Build a matrix, checking that every row has one cell per column.
    pub fn new(data: Vec<Vec<f64>>, row_headers: Vec<Header>, col_headers: Vec<Header>) -> ShapeResult<Self> {
        if data.len() != row_headers.len() {
            return Err(ShapeError::LengthMismatch {
                left: "rows".to_string(),
                right: "row headers".to_string(),
                left_len: data.len(),
                right_len: row_headers.len(),
            });
        }
        if let Some((i, row)) = data.iter().enumerate().find(|(_, r)| r.len() != col_headers.len()) {
            return Err(ShapeError::LengthMismatch {
                left: format!("row {}", row_headers[i]),
                right: "column headers".to_string(),
                left_len: row.len(),
                right_len: col_headers.len(),
            });
        }
        Ok(Self { data, row_headers, col_headers })
    }

    pub fn nrows(&self) -> usize {
        self.data.len()
    }

    pub fn ncols(&self) -> usize {
        self.col_headers.len()
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    pub fn transpose(self) -> Self {
        let (nrows, ncols) = (self.nrows(), self.ncols());
        let data = (0..ncols)
            .map(|j| (0..nrows).map(|i| self.data[i][j]).collect())
            .collect();
        Self {
            data,
            row_headers: self.col_headers,
            col_headers: self.row_headers,
        }
    }
}

// =============================================================================
// Table
// =============================================================================

/// A display table of scalar cells.
///
/// Row headers are blank on every sub-row after the first belonging to the
/// same outer label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<Scalar>>,
    pub row_headers: Vec<String>,
    pub col_headers: Vec<String>,
}

// =============================================================================
// Projections
// =============================================================================

/// Numeric value of a matrix cell. Nulls are missing.
fn cell_value(node: &Node, row: &Header, col: &str) -> ShapeResult<Option<f64>> {
    let non_scalar = |found: String| ShapeError::NonScalarCell {
        row: row.to_string(),
        col: col.to_string(),
        found,
    };
    match node {
        Node::Scalar(Scalar::Null) => Ok(None),
        Node::Scalar(Scalar::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| non_scalar(format!("text '{}'", s))),
        Node::Scalar(scalar) => Ok(scalar.as_f64()),
        other => Err(non_scalar(other.kind().to_string())),
    }
}

/// Build a numeric matrix from a tree.
///
/// Without `field`, the deepest level supplies the columns and every
/// level above it the (possibly multi-level) rows. With `field`, the
/// deepest level holds fields: `field` is picked from each leaf mapping
/// and the level above supplies the columns. On a two-level tree a field
/// selects a single column instead.
///
/// Missing combinations are filled with `missing`; non-numeric cells are
/// a shape error.
pub fn build_matrix(tree: &DataTree, field: Option<&str>, missing: f64) -> ShapeResult<Matrix> {
    let levels = tree.get_paths();
    let depth = levels.len();
    if depth < 2 {
        return Err(ShapeError::TooShallow { expected: 2, found: depth });
    }

    let pick = field.filter(|_| depth > 2);
    let row_depth = if pick.is_some() { depth - 2 } else { depth - 1 };
    let col_labels: Vec<String> = match (field, pick) {
        (Some(f), None) => levels[row_depth].iter().filter(|l| *l == f).cloned().collect(),
        _ => levels[row_depth].clone(),
    };

    let mut data = Vec::new();
    let mut row_headers = Vec::new();
    for (path, row) in tree.flatten(row_depth) {
        let header = Header::new(path);
        let mut cells = Vec::with_capacity(col_labels.len());
        for col in &col_labels {
            let cell = match (row.child(col), pick) {
                (Some(node), Some(f)) => node.child(f),
                (node, _) => node,
            };
            let value = match cell {
                Some(node) => cell_value(node, &header, col)?,
                None => None,
            };
            cells.push(value.unwrap_or(missing));
        }
        data.push(cells);
        row_headers.push(header);
    }

    let col_headers = col_labels.into_iter().map(Header::from).collect();
    Matrix::new(data, row_headers, col_headers)
}

fn table_cell(node: &Node) -> Scalar {
    match node {
        Node::Scalar(s) => s.clone(),
        Node::Series(values) => Scalar::Text(
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","),
        ),
        Node::Mapping(_) => Scalar::Text(node.to_json().to_string()),
    }
}

/// Build a display table from a tree of depth two or more.
///
/// Columns are the deepest level's labels, preceded by one blank-headed
/// column per intermediate level that has more than one distinct label.
/// When every present cell of a row is a series, the row expands into one
/// physical row per element; series of unequal length are a shape error.
pub fn tree_to_table(tree: &DataTree, missing: &Scalar) -> ShapeResult<Table> {
    let levels = tree.get_paths();
    let depth = levels.len();
    if depth < 2 {
        return Err(ShapeError::TooShallow { expected: 2, found: depth });
    }

    let columns = &levels[depth - 1];
    let intermediate = &levels[1..depth - 1];
    let shown: Vec<bool> = intermediate.iter().map(|labels| labels.len() > 1).collect();
    let offset = shown.iter().filter(|s| **s).count();

    let mut col_headers = vec![String::new(); offset];
    col_headers.extend(columns.iter().cloned());
    let ncols = col_headers.len();

    let mut rows = Vec::new();
    let mut row_headers = Vec::new();
    for outer in &levels[0] {
        let mut first = true;
        for middle in crate::tree::cartesian_product(intermediate) {
            let mut prefix = vec![outer.clone()];
            prefix.extend(middle.iter().cloned());

            let present: Vec<(usize, &Node)> = columns
                .iter()
                .enumerate()
                .filter_map(|(z, col)| {
                    let mut path = prefix.clone();
                    path.push(col.clone());
                    tree.get_leaf(&path).map(|node| (z, node))
                })
                .collect();
            if present.is_empty() {
                continue;
            }

            let labels: Vec<Scalar> = middle
                .iter()
                .zip(&shown)
                .filter(|(_, shown)| **shown)
                .map(|(label, _)| Scalar::text(label.as_str()))
                .collect();

            let is_container = present.iter().all(|(_, node)| matches!(node, Node::Series(_)));
            let physical: Vec<Vec<Scalar>> = if is_container {
                let lengths: Vec<usize> = present
                    .iter()
                    .filter_map(|(_, node)| node.as_series().map(<[Scalar]>::len))
                    .collect();
                if lengths.windows(2).any(|w| w[0] != w[1]) {
                    return Err(ShapeError::RaggedRow {
                        row: crate::models::path_to_string(&prefix),
                        lengths,
                    });
                }
                (0..lengths[0])
                    .map(|i| {
                        let mut r = vec![missing.clone(); ncols];
                        for (z, node) in &present {
                            if let Some(values) = node.as_series() {
                                r[z + offset] = values[i].clone();
                            }
                        }
                        r
                    })
                    .collect()
            } else {
                let mut r = vec![missing.clone(); ncols];
                for (z, node) in &present {
                    r[z + offset] = table_cell(node);
                }
                vec![r]
            };

            for (i, mut r) in physical.into_iter().enumerate() {
                if i == 0 {
                    for (k, label) in labels.iter().enumerate() {
                        r[k] = label.clone();
                    }
                }
                row_headers.push(if first { outer.clone() } else { String::new() });
                first = false;
                rows.push(r);
            }
        }
    }

    Ok(Table { rows, row_headers, col_headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> DataTree {
        DataTree::from_node(Node::from(value))
    }

    fn headers(labels: &[&str]) -> Vec<Header> {
        labels.iter().map(|l| Header::from(*l)).collect()
    }

    fn num(n: f64) -> Scalar {
        Scalar::Number(n)
    }

    #[test]
    fn test_header_display() {
        let h = Header::new(vec!["t1".into(), "s1".into()]);
        assert_eq!(h.to_string(), "t1/s1");
        assert!(h.is_multi_level());
        assert_eq!(serde_json::to_value(&h).unwrap(), json!("t1/s1"));
    }

    #[test]
    fn test_build_matrix_fills_missing() {
        let m = build_matrix(&tree(json!({"r1": {"c1": 1, "c2": 2}, "r2": {"c1": 3}})), None, 0.0).unwrap();
        assert_eq!(m.data, vec![vec![1.0, 2.0], vec![3.0, 0.0]]);
        assert_eq!(m.row_headers, headers(&["r1", "r2"]));
        assert_eq!(m.col_headers, headers(&["c1", "c2"]));
    }

    #[test]
    fn test_build_matrix_with_field() {
        let t = tree(json!({
            "t1": {"s1": {"v": 1, "w": 9}, "s2": {"v": 2}},
            "t2": {"s1": {"w": 9}}
        }));
        let m = build_matrix(&t, Some("v"), -1.0).unwrap();
        assert_eq!(m.data, vec![vec![1.0, 2.0], vec![-1.0, -1.0]]);
        assert_eq!(m.col_headers, headers(&["s1", "s2"]));
    }

    #[test]
    fn test_build_matrix_field_on_two_levels_selects_column() {
        let m = build_matrix(&tree(json!({"t1": {"v": 10, "w": 1}, "t2": {"v": 20}})), Some("v"), 0.0).unwrap();
        assert_eq!(m.data, vec![vec![10.0], vec![20.0]]);
        assert_eq!(m.row_headers, headers(&["t1", "t2"]));
        assert_eq!(m.col_headers, headers(&["v"]));
    }

    #[test]
    fn test_build_matrix_multi_level_rows() {
        let t = tree(json!({"t1": {"s1": {"c": 1}, "s2": {"c": 2}}, "t2": {"s1": {"c": 3}}}));
        let m = build_matrix(&t, None, 0.0).unwrap();
        let rows: Vec<String> = m.row_headers.iter().map(|h| h.to_string()).collect();
        assert_eq!(rows, vec!["t1/s1", "t1/s2", "t2/s1"]);
        assert_eq!(m.data, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_build_matrix_rejects_non_scalar() {
        let err = build_matrix(&tree(json!({"r1": {"c1": [1, 2]}})), None, 0.0).unwrap_err();
        assert!(matches!(err, ShapeError::NonScalarCell { .. }));

        let err = build_matrix(&tree(json!({"r1": {"c1": "abc"}})), None, 0.0).unwrap_err();
        assert!(matches!(err, ShapeError::NonScalarCell { .. }));
    }

    #[test]
    fn test_build_matrix_too_shallow() {
        let err = build_matrix(&tree(json!({"c1": 1})), None, 0.0).unwrap_err();
        assert!(matches!(err, ShapeError::TooShallow { expected: 2, found: 1 }));
    }

    #[test]
    fn test_tree_to_table_elides_single_label_levels() {
        let table = tree_to_table(&tree(json!({"A": {"x": {"c1": 1}}, "B": {"x": {"c1": 2}}})), &Scalar::default()).unwrap();
        assert_eq!(table.rows, vec![vec![num(1.0)], vec![num(2.0)]]);
        assert_eq!(table.row_headers, vec!["A", "B"]);
        assert_eq!(table.col_headers, vec!["c1"]);
    }

    #[test]
    fn test_tree_to_table_intermediate_column() {
        let t = tree(json!({"A": {"x": {"c1": 1}, "y": {"c1": 2}}, "B": {"x": {"c1": 3}}}));
        let table = tree_to_table(&t, &Scalar::text("-")).unwrap();
        assert_eq!(table.col_headers, vec!["", "c1"]);
        assert_eq!(table.row_headers, vec!["A", "", "B"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Scalar::text("x"), num(1.0)],
                vec![Scalar::text("y"), num(2.0)],
                vec![Scalar::text("x"), num(3.0)],
            ]
        );
    }

    #[test]
    fn test_tree_to_table_expands_multi_level_rows() {
        let t = tree(json!({"A": {"c1": [1, 2], "c2": [3, 4]}}));
        let table = tree_to_table(&t, &Scalar::default()).unwrap();
        assert_eq!(table.row_headers, vec!["A", ""]);
        assert_eq!(table.rows, vec![vec![num(1.0), num(3.0)], vec![num(2.0), num(4.0)]]);
    }

    #[test]
    fn test_tree_to_table_ragged_rows_fail() {
        let t = tree(json!({"A": {"c1": [1, 2], "c2": [3]}}));
        let err = tree_to_table(&t, &Scalar::default()).unwrap_err();
        assert!(matches!(err, ShapeError::RaggedRow { ref lengths, .. } if lengths == &vec![2, 1]));
    }

    #[test]
    fn test_tree_to_table_missing_cells() {
        let t = tree(json!({"A": {"c1": 1}, "B": {"c2": "x"}}));
        let table = tree_to_table(&t, &Scalar::default()).unwrap();
        assert_eq!(table.col_headers, vec!["c1", "c2"]);
        assert_eq!(table.rows[1], vec![Scalar::Null, Scalar::text("x")]);
    }
}
