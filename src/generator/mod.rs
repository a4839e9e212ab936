//! Batch generation over a [`Dataset`](crate::dataset::Dataset).
//!
//! [`DataGenerator`] slices a dataset into fixed-size minibatches;
//! decorators ([`NanMaskGenerator`], [`BatchDumper`], [`SmearGenerator`])
//! wrap any generator and rewrite its batches, and [`Prefetcher`] computes
//! batches on background threads while preserving batch order.

pub mod batch;
pub mod data_generator;
pub mod dumper;
pub mod nan_mask;
pub mod prefetch;
pub mod smear;

pub use self::batch::{Batch, BatchArray};
pub use self::data_generator::DataGenerator;
pub use self::dumper::BatchDumper;
pub use self::nan_mask::NanMaskGenerator;
pub use self::prefetch::Prefetcher;
pub use self::smear::SmearGenerator;

use crate::dataset::Dataset;
use anyhow::Result;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An indexed source of collated batches.
///
/// `get_batch(i)` must be a pure function of the index so that decorators
/// and prefetch workers can evaluate batches in any order and still agree
/// on the result.
pub trait BatchGenerator: Send + Sync {
    /// Number of batches per epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes batch `index`.
    fn get_batch(&self, index: usize) -> Result<Batch>;

    /// The dataset underlying this generator chain.
    fn dataset(&self) -> &Arc<Dataset>;

    /// Full per-split sample weights, one array per target label.
    fn weights(&self) -> &BTreeMap<String, Array1<f32>>;

    fn input_groups(&self) -> &[String];

    fn target_groups(&self) -> &[String];
}

macro_rules! forward_batch_generator {
    ($type:ty) => {
        impl<G: BatchGenerator + ?Sized> BatchGenerator for $type {
            fn len(&self) -> usize {
                (**self).len()
            }

            fn get_batch(&self, index: usize) -> Result<Batch> {
                (**self).get_batch(index)
            }

            fn dataset(&self) -> &Arc<Dataset> {
                (**self).dataset()
            }

            fn weights(&self) -> &BTreeMap<String, Array1<f32>> {
                (**self).weights()
            }

            fn input_groups(&self) -> &[String] {
                (**self).input_groups()
            }

            fn target_groups(&self) -> &[String] {
                (**self).target_groups()
            }
        }
    };
}

forward_batch_generator!(&G);
forward_batch_generator!(Arc<G>);
forward_batch_generator!(Box<G>);

/// Iterates over every batch of `generator` in index order.
pub fn iter_batches(
    generator: &dyn BatchGenerator,
) -> impl Iterator<Item = Result<Batch>> + '_ {
    (0..generator.len()).map(move |index| generator.get_batch(index))
}
