//! In-memory frame backed by plain column vectors.

use crate::error::Error;
use crate::frame::DataFrame;
use anyhow::{anyhow, Result};
use ndarray::Array1;
use std::collections::BTreeMap;

/// A frame holding all columns in RAM.
///
/// Scalar columns are stored as contiguous arrays; each vlarr column stores
/// one variable-length array per row. Every column must agree on the row
/// count, which is checked at construction.
#[derive(Clone, Debug, Default)]
pub struct DictFrame {
    scalars: BTreeMap<String, Array1<f32>>,
    vlarrs: BTreeMap<String, Vec<Array1<f32>>>,
    n_rows: usize,
}

impl DictFrame {
    /// Builds a frame from raw column vectors.
    pub fn from_columns(
        scalars: BTreeMap<String, Vec<f32>>,
        vlarrs: BTreeMap<String, Vec<Vec<f32>>>,
    ) -> Result<Self> {
        let mut frame = Self::default();

        for (name, values) in scalars {
            frame = frame.with_scalar(name, Array1::from_vec(values))?;
        }

        for (name, rows) in vlarrs {
            let rows = rows.into_iter().map(Array1::from_vec).collect();
            frame = frame.with_vlarr(name, rows)?;
        }

        Ok(frame)
    }

    /// Adds a scalar column. Chainable.
    pub fn with_scalar(mut self, name: impl Into<String>, values: Array1<f32>) -> Result<Self> {
        let name = name.into();
        self.check_length(&name, values.len())?;
        self.scalars.insert(name, values);
        Ok(self)
    }

    /// Adds a vlarr column with one array per row. Chainable.
    pub fn with_vlarr(mut self, name: impl Into<String>, rows: Vec<Array1<f32>>) -> Result<Self> {
        let name = name.into();
        self.check_length(&name, rows.len())?;
        self.vlarrs.insert(name, rows);
        Ok(self)
    }

    fn check_length(&mut self, name: &str, len: usize) -> Result<()> {
        if self.scalars.is_empty() && self.vlarrs.is_empty() {
            self.n_rows = len;
            return Ok(());
        }

        if len != self.n_rows {
            return Err(Error::config(format!(
                "Column '{}' has {} rows, expected {}",
                name, len, self.n_rows
            )));
        }

        Ok(())
    }
}

impl DataFrame for DictFrame {
    fn len(&self) -> usize {
        self.n_rows
    }

    fn scalar_names(&self) -> Vec<String> {
        self.scalars.keys().cloned().collect()
    }

    fn vlarr_names(&self) -> Vec<String> {
        self.vlarrs.keys().cloned().collect()
    }

    fn scalar(&self, column: &str, row: usize) -> Result<f32> {
        let values = self
            .scalars
            .get(column)
            .ok_or_else(|| anyhow!("Unknown scalar column '{}'", column))?;

        values
            .get(row)
            .copied()
            .ok_or_else(|| anyhow!("Row {} out of bounds for column '{}'", row, column))
    }

    fn column(&self, column: &str) -> Result<Array1<f32>> {
        self.scalars
            .get(column)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown scalar column '{}'", column))
    }

    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>> {
        let rows = self
            .vlarrs
            .get(column)
            .ok_or_else(|| anyhow!("Unknown vlarr column '{}'", column))?;

        rows.get(row)
            .cloned()
            .ok_or_else(|| anyhow!("Row {} out of bounds for column '{}'", row, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn make_frame() -> DictFrame {
        DictFrame::default()
            .with_scalar("trueE", arr1(&[1.0, 2.0, 3.0]))
            .unwrap()
            .with_vlarr(
                "png.calE",
                vec![arr1(&[0.5]), arr1(&[]), arr1(&[0.1, 0.2])],
            )
            .unwrap()
    }

    #[test]
    fn test_access() -> Result<()> {
        let frame = make_frame();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.scalar("trueE", 2)?, 3.0);
        assert_eq!(frame.column("trueE")?, arr1(&[1.0, 2.0, 3.0]));
        assert_eq!(frame.vlarr("png.calE", 1)?.len(), 0);
        assert_eq!(frame.vlarr("png.calE", 2)?, arr1(&[0.1, 0.2]));

        assert!(frame.has_scalar("trueE"));
        assert!(!frame.has_scalar("png.calE"));
        assert!(frame.has_vlarr("png.calE"));
        Ok(())
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = make_frame().with_scalar("bad", arr1(&[1.0]));
        assert!(result.is_err());
    }
}
