//! Per-row record produced by the dataset layer.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// A `Row` is one fully assembled event record.
///
/// It maps group names to their per-row arrays:
/// - **Scalar groups**: a fixed-width feature vector, shape `(n_features,)`.
/// - **Vlarr groups**: a ragged feature matrix, shape
///   `(prong_count, n_features)` where `prong_count` varies row to row.
///
/// # Examples
/// - `{"input_slice": [12.1, 0.3], "input_png3d": [[...], [...]]}` for an
///   event with two reconstructed prongs,
/// - a zero-prong event carries an empty `(0, n_features)` matrix rather
///   than being an error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    pub scalars: HashMap<String, Array1<f32>>,
    pub vlarrs: HashMap<String, Array2<f32>>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites a scalar group. Chainable.
    pub fn with_scalar(mut self, group: impl Into<String>, values: Array1<f32>) -> Self {
        self.scalars.insert(group.into(), values);
        self
    }

    /// Adds or overwrites a vlarr group. Chainable.
    pub fn with_vlarr(mut self, group: impl Into<String>, values: Array2<f32>) -> Self {
        self.vlarrs.insert(group.into(), values);
        self
    }

    /// Returns the scalar feature vector for a group.
    pub fn scalar(&self, group: &str) -> Result<&Array1<f32>> {
        self.scalars
            .get(group)
            .ok_or_else(|| anyhow!("Scalar group '{}' not found in row", group))
    }

    /// Returns the ragged prong matrix for a group.
    pub fn vlarr(&self, group: &str) -> Result<&Array2<f32>> {
        self.vlarrs
            .get(group)
            .ok_or_else(|| anyhow!("Vlarr group '{}' not found in row", group))
    }

    /// Iterates over all group names in this row.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.scalars
            .keys()
            .chain(self.vlarrs.keys())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod row_tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_row_construction_and_access() -> Result<()> {
        let row = Row::new()
            .with_scalar("input_slice", arr1(&[1.0, 2.0]))
            .with_vlarr("input_png3d", arr2(&[[0.5, 0.6], [0.7, 0.8]]));

        assert_eq!(row.scalar("input_slice")?.len(), 2);
        assert_eq!(row.vlarr("input_png3d")?.nrows(), 2);
        assert!(row.scalar("missing").is_err());
        assert!(row.vlarr("input_slice").is_err());

        let groups: Vec<_> = row.groups().collect();
        assert!(groups.contains(&"input_slice"));
        assert!(groups.contains(&"input_png3d"));
        Ok(())
    }

    #[test]
    fn test_zero_prong_row() {
        let row = Row::new().with_vlarr("input_png3d", Array2::zeros((0, 4)));
        assert_eq!(row.vlarr("input_png3d").unwrap().nrows(), 0);
        assert_eq!(row.vlarr("input_png3d").unwrap().ncols(), 4);
    }
}
