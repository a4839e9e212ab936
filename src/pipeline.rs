//! End-to-end assembly: configuration in, batch generators out.
//!
//! The functions here chain the layers in their fixed order: open the
//! frame, compute derived weighting variables, shuffle, split, build one
//! dataset per requested split, and wrap each in a batch generator.
//! Everything downstream of the config is deterministic, so two calls
//! with the same config and data produce bit-identical batches.

use crate::config::DataConfig;
use crate::dataset::Dataset;
use crate::frame::{open_frame, train_test_split, DataFrame, ShuffleFrame, Split, VarFrame};
use crate::generator::DataGenerator;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Opens the configured frame and applies derived variables, the seeded
/// shuffle, and the train/val/test partition.
pub fn create_data_frame(
    config: &DataConfig,
    datadir: Option<&Path>,
) -> Result<[Arc<dyn DataFrame>; 3]> {
    let mut frame = open_frame(&config.frame, datadir).context("Failed to open data frame")?;
    info!(rows = frame.len(), "Loaded data frame");

    if let Some(variables) = &config.extra_vars {
        frame = Arc::new(
            VarFrame::new(frame, variables).context("Failed to compute derived variables")?,
        );
    }

    if config.shuffle {
        frame = Arc::new(ShuffleFrame::new(frame, config.seed));
    }

    train_test_split(frame, config.val_size, config.test_size)
}

/// Builds one [`Dataset`] per requested split over pre-partitioned frames.
///
/// Target labels become scalar groups alongside the scalar inputs, so a
/// single group namespace serves both sides of a batch.
pub fn create_datasets(
    config: &DataConfig,
    frames: &[Arc<dyn DataFrame>; 3],
    cache: bool,
    splits: &[Split],
) -> Result<Vec<Arc<Dataset>>> {
    let mut scalar_groups = config.input_groups_scalar.clone();
    for (label, columns) in &config.target_groups {
        scalar_groups.insert(label.clone(), columns.clone());
    }

    let vlarr_limits = config.vlarr_limits.clone().unwrap_or_default();

    splits
        .iter()
        .map(|&split| {
            let dataset = Dataset::from_frame(
                frames[split.index()].clone(),
                cache,
                split,
                scalar_groups.clone(),
                config.input_groups_vlarr.clone(),
                vlarr_limits.clone(),
                &config.transform_train,
                &config.transform_test,
                config.seed,
            )
            .with_context(|| format!("Failed to build dataset for split {:?}", split))?;

            Ok(Arc::new(dataset))
        })
        .collect()
}

/// Builds one [`DataGenerator`] per requested split, straight from the
/// configuration.
pub fn create_data_generators(
    config: &DataConfig,
    batch_size: usize,
    splits: &[Split],
    datadir: Option<&Path>,
    cache: bool,
) -> Result<Vec<DataGenerator>> {
    let frames = create_data_frame(config, datadir)?;
    let datasets = create_datasets(config, &frames, cache, splits)?;

    let input_groups: Vec<String> = config
        .input_groups_scalar
        .keys()
        .chain(config.input_groups_vlarr.keys())
        .cloned()
        .collect();
    let target_groups: Vec<String> = config.target_groups.keys().cloned().collect();

    splits
        .iter()
        .zip(datasets)
        .map(|(&split, dataset)| {
            info!(
                split = ?split,
                rows = dataset.len(),
                batch_size,
                "Creating data generator"
            );
            DataGenerator::new(
                dataset,
                input_groups.clone(),
                target_groups.clone(),
                batch_size,
                config.weights.as_ref(),
            )
            .with_context(|| format!("Failed to build generator for split {:?}", split))
        })
        .collect()
}

/// Materializes every cached dataset row before training starts.
pub fn precache(datasets: &[Arc<Dataset>]) -> Result<()> {
    for dataset in datasets {
        dataset.precache()?;
    }
    Ok(())
}
