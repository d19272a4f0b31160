//! CSV export of rendered blocks.
//!
//! The first column holds the row headers; the header record holds the
//! column headers behind an empty corner cell.

use csv::WriterBuilder;

use crate::error::{RenderError, RenderResult};
use crate::models::Scalar;
use crate::table::{Matrix, Table};

use super::Block;

fn csv_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Failed(format!("CSV export failed: {}", e))
}

fn write_records(records: Vec<Vec<String>>) -> RenderResult<String> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for record in records {
        writer.write_record(&record).map_err(csv_error)?;
    }
    let bytes = writer.into_inner().map_err(csv_error)?;
    String::from_utf8(bytes).map_err(csv_error)
}

fn matrix_records(matrix: &Matrix) -> Vec<Vec<String>> {
    let mut header = vec![String::new()];
    header.extend(matrix.col_headers.iter().map(|h| h.to_string()));

    let mut records = vec![header];
    for (row, values) in matrix.row_headers.iter().zip(&matrix.data) {
        let mut record = vec![row.to_string()];
        record.extend(values.iter().map(|v| Scalar::Number(*v).to_string()));
        records.push(record);
    }
    records
}

fn table_records(table: &Table) -> Vec<Vec<String>> {
    let mut header = vec![String::new()];
    header.extend(table.col_headers.iter().cloned());

    let mut records = vec![header];
    for (row, values) in table.row_headers.iter().zip(&table.rows) {
        let mut record = vec![row.clone()];
        record.extend(values.iter().map(|v| v.to_string()));
        records.push(record);
    }
    records
}

pub fn matrix_to_csv(matrix: &Matrix) -> RenderResult<String> {
    write_records(matrix_records(matrix))
}

pub fn table_to_csv(table: &Table) -> RenderResult<String> {
    write_records(table_records(table))
}

/// Export several blocks, each preceded by a `# title` record and
/// separated by an empty record.
pub fn blocks_to_csv(blocks: &[Block]) -> RenderResult<String> {
    let mut records = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            records.push(vec![String::new()]);
        }
        records.push(vec![format!("# {}", block.title())]);
        match block {
            Block::Matrix { matrix, .. } => records.extend(matrix_records(matrix)),
            Block::Table { table, .. } => records.extend(table_records(table)),
            Block::Text { text, .. } => records.push(vec![text.clone()]),
            Block::Error { stage, message, .. } => {
                records.push(vec![format!("error in {}", stage), message.clone()])
            }
        }
    }
    write_records(records)
}
