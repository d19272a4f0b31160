//! Matrix reshape operators
//!
//! Every operator takes a matrix with its headers and returns a new one.
//! Operators compose left-to-right: each sees only the output of the
//! previous one.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::logs::{log_debug, log_warning};
use crate::error::{ConfigError, ShapeError, ShapeResult};

use super::correspondence;
use super::{Header, Matrix};

/// Label of rows and columns inserted by the total operators.
pub const TOTAL_LABEL: &str = "total";

/// All available matrix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatrixOperator {
    /// Swap rows and columns
    Transpose,

    /// Divide each row by its sum
    NormalizedRowTotal,

    /// Divide each row by its maximum
    NormalizedRowMax,

    /// Divide each column by its sum
    NormalizedColTotal,

    /// Divide each column by its maximum
    NormalizedColMax,

    /// Divide every cell by the grand total
    NormalizedTotal,

    /// Divide every cell by the overall maximum
    NormalizedMax,

    /// Make a square matrix symmetric taking the larger of each pair
    SymmetricMax,

    /// Make a square matrix symmetric taking the smaller of each pair
    SymmetricMin,

    /// Make a square matrix symmetric taking the mean of each pair
    SymmetricAvg,

    /// Make a square matrix symmetric taking the sum of each pair
    SymmetricSum,

    /// Keep only rows and columns whose header appears on both axes
    #[serde(alias = "filter")]
    Square,

    /// Append a row of column totals
    AddRowTotal,

    /// Append a column of row totals
    AddColumnTotal,

    /// Natural sort of both axes
    Sort,

    /// Joint row/column reordering by correspondence analysis
    #[serde(alias = "correspondence-analysis")]
    Correspondence,
}

impl MatrixOperator {
    pub const ALL: [MatrixOperator; 16] = [
        MatrixOperator::Transpose,
        MatrixOperator::NormalizedRowTotal,
        MatrixOperator::NormalizedRowMax,
        MatrixOperator::NormalizedColTotal,
        MatrixOperator::NormalizedColMax,
        MatrixOperator::NormalizedTotal,
        MatrixOperator::NormalizedMax,
        MatrixOperator::SymmetricMax,
        MatrixOperator::SymmetricMin,
        MatrixOperator::SymmetricAvg,
        MatrixOperator::SymmetricSum,
        MatrixOperator::Square,
        MatrixOperator::AddRowTotal,
        MatrixOperator::AddColumnTotal,
        MatrixOperator::Sort,
        MatrixOperator::Correspondence,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            MatrixOperator::Transpose => "transpose",
            MatrixOperator::NormalizedRowTotal => "normalized-row-total",
            MatrixOperator::NormalizedRowMax => "normalized-row-max",
            MatrixOperator::NormalizedColTotal => "normalized-col-total",
            MatrixOperator::NormalizedColMax => "normalized-col-max",
            MatrixOperator::NormalizedTotal => "normalized-total",
            MatrixOperator::NormalizedMax => "normalized-max",
            MatrixOperator::SymmetricMax => "symmetric-max",
            MatrixOperator::SymmetricMin => "symmetric-min",
            MatrixOperator::SymmetricAvg => "symmetric-avg",
            MatrixOperator::SymmetricSum => "symmetric-sum",
            MatrixOperator::Square => "square",
            MatrixOperator::AddRowTotal => "add-row-total",
            MatrixOperator::AddColumnTotal => "add-column-total",
            MatrixOperator::Sort => "sort",
            MatrixOperator::Correspondence => "correspondence",
        }
    }

    /// Apply this operator to a matrix
    pub fn apply(&self, matrix: Matrix) -> ShapeResult<Matrix> {
        match self {
            MatrixOperator::Transpose => Ok(matrix.transpose()),
            MatrixOperator::NormalizedRowTotal => Ok(normalize_rows(matrix, |row| row.iter().sum())),
            MatrixOperator::NormalizedRowMax => Ok(normalize_rows(matrix, max_of)),
            MatrixOperator::NormalizedColTotal => {
                Ok(normalize_rows(matrix.transpose(), |row| row.iter().sum()).transpose())
            }
            MatrixOperator::NormalizedColMax => Ok(normalize_rows(matrix.transpose(), max_of).transpose()),
            MatrixOperator::NormalizedTotal => {
                let total: f64 = matrix.data.iter().flatten().sum();
                Ok(scale_all(matrix, total))
            }
            MatrixOperator::NormalizedMax => {
                let max = max_of(&matrix.data.iter().flatten().copied().collect::<Vec<_>>());
                Ok(scale_all(matrix, max))
            }
            MatrixOperator::SymmetricMax => symmetrize(matrix, f64::max),
            MatrixOperator::SymmetricMin => symmetrize(matrix, f64::min),
            MatrixOperator::SymmetricAvg => symmetrize(matrix, |a, b| (a + b) / 2.0),
            MatrixOperator::SymmetricSum => symmetrize(matrix, |a, b| a + b),
            MatrixOperator::Square => Ok(square(matrix)),
            MatrixOperator::AddRowTotal => Ok(add_row_total(matrix)),
            MatrixOperator::AddColumnTotal => Ok(add_row_total(matrix.transpose()).transpose()),
            MatrixOperator::Sort => Ok(sort(matrix)),
            MatrixOperator::Correspondence => Ok(correspondence_reorder(matrix)),
        }
    }
}

impl FromStr for MatrixOperator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "filter" => return Ok(MatrixOperator::Square),
            "correspondence-analysis" => return Ok(MatrixOperator::Correspondence),
            _ => {}
        }
        Self::ALL
            .iter()
            .find(|op| op.keyword() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownOperator(s.to_string()))
    }
}

impl std::fmt::Display for MatrixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Parse a comma-separated operator list.
pub fn parse_operators(list: &str) -> Result<Vec<MatrixOperator>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(MatrixOperator::from_str)
        .collect()
}

/// Apply operators in order.
pub fn apply_operators(mut matrix: Matrix, operators: &[MatrixOperator]) -> ShapeResult<Matrix> {
    for op in operators {
        log_debug(format!(
            "Applying matrix operator '{}' to {}x{} matrix",
            op,
            matrix.nrows(),
            matrix.ncols()
        ));
        matrix = op.apply(matrix)?;
    }
    Ok(matrix)
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Divide each row by `divisor(row)`. Rows with a zero divisor stay unchanged.
fn normalize_rows(mut matrix: Matrix, divisor: impl Fn(&[f64]) -> f64) -> Matrix {
    for row in &mut matrix.data {
        let d = divisor(row.as_slice());
        if d != 0.0 && d.is_finite() {
            row.iter_mut().for_each(|v| *v /= d);
        }
    }
    matrix
}

fn scale_all(mut matrix: Matrix, divisor: f64) -> Matrix {
    if divisor != 0.0 && divisor.is_finite() {
        matrix.data.iter_mut().flatten().for_each(|v| *v /= divisor);
    }
    matrix
}

fn symmetrize(mut matrix: Matrix, combine: impl Fn(f64, f64) -> f64) -> ShapeResult<Matrix> {
    if !matrix.is_square() {
        return Err(ShapeError::NotSquare {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    let n = matrix.nrows();
    for x in 0..n {
        for y in x + 1..n {
            let v = combine(matrix.data[x][y], matrix.data[y][x]);
            matrix.data[x][y] = v;
            matrix.data[y][x] = v;
        }
    }
    Ok(matrix)
}

/// Rows and columns whose header appears on both axes, both in row order.
fn square(matrix: Matrix) -> Matrix {
    let keep: Vec<(usize, usize)> = matrix
        .row_headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| matrix.col_headers.iter().position(|c| c == h).map(|j| (i, j)))
        .collect();

    let data = keep
        .iter()
        .map(|(i, _)| keep.iter().map(|(_, j)| matrix.data[*i][*j]).collect())
        .collect();
    let headers: Vec<Header> = keep.iter().map(|(i, _)| matrix.row_headers[*i].clone()).collect();

    Matrix {
        data,
        row_headers: headers.clone(),
        col_headers: headers,
    }
}

fn add_row_total(mut matrix: Matrix) -> Matrix {
    let totals = (0..matrix.ncols())
        .map(|j| matrix.data.iter().map(|row| row[j]).sum())
        .collect();
    matrix.data.push(totals);
    matrix.row_headers.push(Header::from(TOTAL_LABEL));
    matrix
}

fn permute(matrix: Matrix, rows: &[usize], cols: &[usize]) -> Matrix {
    Matrix {
        data: rows
            .iter()
            .map(|i| cols.iter().map(|j| matrix.data[*i][*j]).collect())
            .collect(),
        row_headers: rows.iter().map(|i| matrix.row_headers[*i].clone()).collect(),
        col_headers: cols.iter().map(|j| matrix.col_headers[*j].clone()).collect(),
    }
}

fn sort(matrix: Matrix) -> Matrix {
    let order = |headers: &[Header]| {
        let mut idx: Vec<usize> = (0..headers.len()).collect();
        idx.sort_by(|a, b| natural_cmp(&headers[*a].to_string(), &headers[*b].to_string()));
        idx
    };
    let rows = order(&matrix.row_headers);
    let cols = order(&matrix.col_headers);
    permute(matrix, &rows, &cols)
}

fn correspondence_reorder(matrix: Matrix) -> Matrix {
    match correspondence::reorder(&matrix.data) {
        Some((rows, cols)) => permute(matrix, &rows, &cols),
        None => {
            log_warning("Correspondence analysis not solvable, matrix left unchanged");
            matrix
        }
    }
}

/// Compare strings with embedded numbers by value: `t2 < t10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        let a_digit = a.starts_with(|c: char| c.is_ascii_digit());
        let b_digit = b.starts_with(|c: char| c.is_ascii_digit());
        let a_end = a.find(|c: char| c.is_ascii_digit() != a_digit).unwrap_or(a.len());
        let b_end = b.find(|c: char| c.is_ascii_digit() != b_digit).unwrap_or(b.len());
        let (a_chunk, b_chunk) = (&a[..a_end], &b[..b_end]);

        let ord = if a_digit && b_digit {
            let a_num = a_chunk.trim_start_matches('0');
            let b_num = b_chunk.trim_start_matches('0');
            a_num
                .len()
                .cmp(&b_num.len())
                .then_with(|| a_num.cmp(b_num))
                .then_with(|| a_chunk.len().cmp(&b_chunk.len()))
        } else {
            a_chunk.cmp(b_chunk)
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = &a[a_end..];
        b = &b[b_end..];
    }
}

/// Get a description of all available matrix operators
pub fn operators_description() -> String {
    r#"Available matrix operators (applied left to right):

| Operator | Description |
|----------|-------------|
| transpose | Swap rows and columns |
| normalized-row-total | Divide each row by its sum |
| normalized-row-max | Divide each row by its maximum |
| normalized-col-total | Divide each column by its sum |
| normalized-col-max | Divide each column by its maximum |
| normalized-total | Divide every cell by the grand total |
| normalized-max | Divide every cell by the overall maximum |
| symmetric-max | Symmetrize a square matrix with the larger value of each pair |
| symmetric-min | Symmetrize a square matrix with the smaller value of each pair |
| symmetric-avg | Symmetrize a square matrix with the mean of each pair |
| symmetric-sum | Symmetrize a square matrix with the sum of each pair |
| square (filter) | Keep rows and columns present on both axes |
| add-row-total | Append a row of column totals |
| add-column-total | Append a column of row totals |
| sort | Natural sort of row and column headers |
| correspondence | Reorder rows and columns by correspondence analysis |

Rows or columns whose divisor is zero are left unchanged by the normalizations.

Example: --operators square,symmetric-max,normalized-row-total"#
        .to_string()
}
