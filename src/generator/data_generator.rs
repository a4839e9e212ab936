//! The base batch generator: dataset rows to collated minibatches.

use crate::dataset::Dataset;
use crate::error::Error;
use crate::generator::batch::{collate_group, collate_scalar, Batch};
use crate::generator::BatchGenerator;
use crate::row::Row;
use anyhow::{Context, Result};
use ndarray::{s, Array1};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Slices a [`Dataset`] into fixed-size batches.
///
/// The final batch is allowed to be short: an `n`-row dataset with batch
/// size `b` yields `ceil(n / b)` batches. Per-label sample weights are
/// resolved once at construction, either from a frame column named in
/// `weight_spec` or as all-ones, and are served back per batch as a slice
/// of the full array.
pub struct DataGenerator {
    dataset: Arc<Dataset>,
    input_groups: Vec<String>,
    target_groups: Vec<String>,
    batch_size: usize,
    weights: BTreeMap<String, Array1<f32>>,
}

impl DataGenerator {
    pub fn new(
        dataset: Arc<Dataset>,
        input_groups: Vec<String>,
        target_groups: Vec<String>,
        batch_size: usize,
        weight_spec: Option<&BTreeMap<String, String>>,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(Error::config("Cannot batch an empty dataset".to_string()));
        }

        if batch_size == 0 {
            return Err(Error::config("Batch size must be positive".to_string()));
        }

        for group in input_groups.iter().chain(&target_groups) {
            if !dataset.is_scalar_group(group) && !dataset.is_vlarr_group(group) {
                return Err(Error::config(format!("Unknown group '{}'", group)));
            }
        }

        for group in &target_groups {
            if !dataset.is_scalar_group(group) {
                return Err(Error::config(format!(
                    "Target group '{}' must be a scalar group",
                    group
                )));
            }
        }

        let weights = resolve_weights(&dataset, &target_groups, weight_spec)?;

        Ok(Self {
            dataset,
            input_groups,
            target_groups,
            batch_size,
            weights,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index range of batch `index` within the dataset.
    fn batch_range(&self, index: usize) -> Result<(usize, usize)> {
        let start = index * self.batch_size;
        if start >= self.dataset.len() {
            return Err(Error::batch(format!(
                "Batch {} out of bounds for {} batches",
                index,
                self.len()
            )));
        }

        let end = (start + self.batch_size).min(self.dataset.len());
        Ok((start, end))
    }
}

impl BatchGenerator for DataGenerator {
    fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn get_batch(&self, index: usize) -> Result<Batch> {
        let (start, end) = self.batch_range(index)?;
        debug!(index, start, end, "Collating batch");

        let rows: Vec<Row> = (start..end)
            .map(|row| self.dataset.get_row(row))
            .collect::<Result<_>>()
            .with_context(|| format!("Failed to assemble rows for batch {}", index))?;

        let mut inputs = BTreeMap::new();
        for group in &self.input_groups {
            inputs.insert(group.clone(), collate_group(&self.dataset, &rows, group)?);
        }

        let mut targets = BTreeMap::new();
        for group in &self.target_groups {
            targets.insert(group.clone(), collate_scalar(&rows, group)?);
        }

        let mut weights = BTreeMap::new();
        for (label, full) in &self.weights {
            weights.insert(label.clone(), full.slice(s![start..end]).to_owned());
        }

        Ok(Batch {
            inputs,
            targets,
            weights,
        })
    }

    fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    fn weights(&self) -> &BTreeMap<String, Array1<f32>> {
        &self.weights
    }

    fn input_groups(&self) -> &[String] {
        &self.input_groups
    }

    fn target_groups(&self) -> &[String] {
        &self.target_groups
    }
}

/// Resolves one weight array per target label.
///
/// A label mapped in `weight_spec` reads the named frame column verbatim;
/// unmapped labels get all-ones. No re-normalization happens here: the
/// weighting frames already fixed the scale of their columns.
fn resolve_weights(
    dataset: &Dataset,
    target_groups: &[String],
    weight_spec: Option<&BTreeMap<String, String>>,
) -> Result<BTreeMap<String, Array1<f32>>> {
    if let Some(spec) = weight_spec {
        for label in spec.keys() {
            if !target_groups.contains(label) {
                return Err(Error::config(format!(
                    "Weight spec references unknown target label '{}'",
                    label
                )));
            }
        }
    }

    let mut weights = BTreeMap::new();
    for label in target_groups {
        let column = weight_spec.and_then(|spec| spec.get(label));
        let array = match column {
            Some(column) => dataset
                .frame()
                .column(column)
                .with_context(|| format!("Failed to read weight column for label '{}'", label))?,
            None => Array1::ones(dataset.len()),
        };

        if array.len() != dataset.len() {
            return Err(Error::config(format!(
                "Weight column for label '{}' has {} rows, expected {}",
                label,
                array.len(),
                dataset.len()
            )));
        }

        weights.insert(label.clone(), array);
    }

    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DataFrame, DictFrame, Split};
    use ndarray::arr1;

    fn make_dataset(weight_column: Option<Array1<f32>>) -> Arc<Dataset> {
        let mut frame = DictFrame::default()
            .with_scalar("trueE", arr1(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap()
            .with_vlarr(
                "png.calE",
                vec![
                    arr1(&[0.1]),
                    arr1(&[0.2, 0.3]),
                    arr1(&[]),
                    arr1(&[0.4]),
                    arr1(&[0.5, 0.6, 0.7]),
                ],
            )
            .unwrap();

        if let Some(column) = weight_column {
            frame = frame.with_scalar("weight", column).unwrap();
        }

        let frame: Arc<dyn DataFrame> = Arc::new(frame);
        Arc::new(
            Dataset::from_frame(
                frame,
                false,
                Split::Train,
                BTreeMap::from([("total".to_string(), vec!["trueE".to_string()])]),
                BTreeMap::from([("input_png3d".to_string(), vec!["png.calE".to_string()])]),
                BTreeMap::new(),
                &[],
                &[],
                0,
            )
            .unwrap(),
        )
    }

    fn make_generator(batch_size: usize) -> DataGenerator {
        DataGenerator::new(
            make_dataset(None),
            vec!["input_png3d".to_string()],
            vec!["total".to_string()],
            batch_size,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_batch_count_rounds_up() {
        assert_eq!(make_generator(2).len(), 3);
        assert_eq!(make_generator(5).len(), 1);
        assert_eq!(make_generator(7).len(), 1);
    }

    #[test]
    fn test_short_final_batch() -> Result<()> {
        let generator = make_generator(2);

        assert_eq!(generator.get_batch(0)?.batch_size(), 2);
        assert_eq!(generator.get_batch(1)?.batch_size(), 2);
        assert_eq!(generator.get_batch(2)?.batch_size(), 1);
        assert!(generator.get_batch(3).is_err());
        Ok(())
    }

    #[test]
    fn test_targets_and_default_weights() -> Result<()> {
        let generator = make_generator(2);
        let batch = generator.get_batch(1)?;

        assert_eq!(batch.target("total")?.column(0), arr1(&[3.0, 4.0]));
        assert_eq!(batch.weight("total")?, arr1(&[1.0, 1.0]));
        Ok(())
    }

    #[test]
    fn test_weight_column_served_verbatim() -> Result<()> {
        let dataset = make_dataset(Some(arr1(&[2.0, 2.0, 2.0, 2.0, 2.0])));
        let spec = BTreeMap::from([("total".to_string(), "weight".to_string())]);

        let generator = DataGenerator::new(
            dataset,
            vec!["input_png3d".to_string()],
            vec!["total".to_string()],
            2,
            Some(&spec),
        )?;

        // Columns pass through without re-normalization.
        let batch = generator.get_batch(0)?;
        assert_eq!(batch.weight("total")?, arr1(&[2.0, 2.0]));
        Ok(())
    }

    #[test]
    fn test_invalid_construction() {
        let dataset = make_dataset(None);

        assert!(DataGenerator::new(
            dataset.clone(),
            vec!["missing".to_string()],
            vec!["total".to_string()],
            2,
            None,
        )
        .is_err());

        assert!(DataGenerator::new(
            dataset.clone(),
            vec!["input_png3d".to_string()],
            vec!["total".to_string()],
            0,
            None,
        )
        .is_err());

        let bad_spec = BTreeMap::from([("secondary".to_string(), "weight".to_string())]);
        assert!(DataGenerator::new(
            dataset,
            vec!["input_png3d".to_string()],
            vec!["total".to_string()],
            2,
            Some(&bad_spec),
        )
        .is_err());
    }
}
