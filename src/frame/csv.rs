//! Delimited-text frame, fully materialized in memory.
//!
//! Scalar columns hold one float per cell. Vlarr columns pack the per-row
//! array into a single quoted cell, values joined by `,`; an empty cell is
//! a zero-prong row. A column is classified as vlarr when any of its cells
//! holds zero or more than one value, otherwise it is scalar.

use crate::error::Error;
use crate::frame::{DataFrame, DictFrame};
use anyhow::{Context, Result};
use ndarray::Array1;
use std::path::Path;

/// A frame loaded from a CSV file.
///
/// Parsing happens once at `open` time; access afterwards is pure in-memory
/// lookup and never blocks on I/O.
#[derive(Clone, Debug)]
pub struct CsvFrame {
    inner: DictFrame,
}

impl CsvFrame {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read csv header")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut cells: Vec<Vec<Vec<f32>>> = vec![Vec::new(); headers.len()];

        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed csv record {}", row))?;

            if record.len() != headers.len() {
                return Err(Error::config(format!(
                    "Record {} has {} fields, header has {}",
                    row,
                    record.len(),
                    headers.len()
                )));
            }

            for (col, field) in record.iter().enumerate() {
                cells[col].push(parse_cell(field).with_context(|| {
                    format!("Bad value in column '{}', row {}", headers[col], row)
                })?);
            }
        }

        let mut frame = DictFrame::default();

        for (name, column) in headers.into_iter().zip(cells) {
            if column.iter().all(|cell| cell.len() == 1) {
                let values = column.into_iter().map(|cell| cell[0]).collect();
                frame = frame.with_scalar(name, Array1::from_vec(values))?;
            } else {
                let rows = column.into_iter().map(Array1::from_vec).collect();
                frame = frame.with_vlarr(name, rows)?;
            }
        }

        Ok(Self { inner: frame })
    }
}

fn parse_cell(field: &str) -> Result<Vec<f32>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(Vec::new());
    }

    field
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .with_context(|| format!("Failed to parse '{}' as float", v))
        })
        .collect()
}

impl DataFrame for CsvFrame {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn scalar_names(&self) -> Vec<String> {
        self.inner.scalar_names()
    }

    fn vlarr_names(&self) -> Vec<String> {
        self.inner.vlarr_names()
    }

    fn scalar(&self, column: &str, row: usize) -> Result<f32> {
        self.inner.scalar(column, row)
    }

    fn column(&self, column: &str) -> Result<Array1<f32>> {
        self.inner.column(column)
    }

    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>> {
        self.inner.vlarr(column, row)
    }
}
