//! Collated batches of fixed-shape arrays.

use crate::consts::DEF_MASK;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::row::Row;
use anyhow::Result;
use ndarray::{s, Array1, Array2, Array3};
use serde::Serialize;
use std::collections::BTreeMap;

/// One collated input group.
///
/// Scalar groups collate to `(batch, features)`; vlarr groups pad every
/// row to a common prong count and collate to `(batch, prongs, features)`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchArray {
    Scalar(Array2<f32>),
    Vlarr(Array3<f32>),
}

impl BatchArray {
    pub fn batch_size(&self) -> usize {
        match self {
            BatchArray::Scalar(a) => a.nrows(),
            BatchArray::Vlarr(a) => a.dim().0,
        }
    }
}

/// A collated minibatch: inputs, targets and per-label sample weights.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Batch {
    pub inputs: BTreeMap<String, BatchArray>,
    pub targets: BTreeMap<String, Array2<f32>>,
    pub weights: BTreeMap<String, Array1<f32>>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.inputs
            .values()
            .next()
            .map(BatchArray::batch_size)
            .or_else(|| self.targets.values().next().map(|t| t.nrows()))
            .unwrap_or(0)
    }

    pub fn input(&self, group: &str) -> Result<&BatchArray> {
        self.inputs
            .get(group)
            .ok_or_else(|| Error::batch(format!("Unknown input group '{}'", group)))
    }

    pub fn target(&self, group: &str) -> Result<&Array2<f32>> {
        self.targets
            .get(group)
            .ok_or_else(|| Error::batch(format!("Unknown target group '{}'", group)))
    }

    pub fn weight(&self, group: &str) -> Result<&Array1<f32>> {
        self.weights
            .get(group)
            .ok_or_else(|| Error::batch(format!("Unknown weight group '{}'", group)))
    }
}

/// Collates one group across `rows` into a fixed-shape array.
///
/// Vlarr groups are padded with the mask value up to `limit` prongs when a
/// limit is configured, otherwise up to the longest row in the batch.
pub(crate) fn collate_group(
    dataset: &Dataset,
    rows: &[Row],
    group: &str,
) -> Result<BatchArray> {
    if dataset.is_scalar_group(group) {
        return Ok(BatchArray::Scalar(collate_scalar(rows, group)?));
    }

    if !dataset.is_vlarr_group(group) {
        return Err(Error::batch(format!("Unknown group '{}'", group)));
    }

    let width = dataset.group_width(group)?;
    let n_prongs = match dataset.vlarr_limit(group) {
        Some(limit) => limit,
        None => rows
            .iter()
            .map(|row| row.vlarrs.get(group).map(|m| m.nrows()).unwrap_or(0))
            .max()
            .unwrap_or(0),
    };

    let mut batch = Array3::from_elem((rows.len(), n_prongs, width), DEF_MASK);
    for (r, row) in rows.iter().enumerate() {
        let matrix = row
            .vlarrs
            .get(group)
            .ok_or_else(|| Error::batch(format!("Row missing vlarr group '{}'", group)))?;
        let take = matrix.nrows().min(n_prongs);
        batch
            .slice_mut(s![r, ..take, ..])
            .assign(&matrix.slice(s![..take, ..]));
    }

    Ok(BatchArray::Vlarr(batch))
}

pub(crate) fn collate_scalar(rows: &[Row], group: &str) -> Result<Array2<f32>> {
    let width = rows
        .first()
        .and_then(|row| row.scalars.get(group))
        .map(|a| a.len())
        .ok_or_else(|| Error::batch(format!("Row missing scalar group '{}'", group)))?;

    let mut batch = Array2::zeros((rows.len(), width));
    for (r, row) in rows.iter().enumerate() {
        let values = row
            .scalars
            .get(group)
            .ok_or_else(|| Error::batch(format!("Row missing scalar group '{}'", group)))?;
        batch.row_mut(r).assign(values);
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_scalar_collation() -> Result<()> {
        let rows = vec![
            Row::new().with_scalar("total", arr1(&[1.0, 2.0])),
            Row::new().with_scalar("total", arr1(&[3.0, 4.0])),
        ];

        let batch = collate_scalar(&rows, "total")?;
        assert_eq!(batch, arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        Ok(())
    }

    #[test]
    fn test_missing_group_rejected() {
        let rows = vec![Row::new()];
        assert!(collate_scalar(&rows, "total").is_err());
    }
}
