//! Seeded row-permutation view.

use crate::frame::DataFrame;
use anyhow::Result;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;

/// A view that presents its inner frame in a shuffled row order.
///
/// The permutation is drawn once at construction from the given seed, so
/// two frames built with the same seed over the same data see identical
/// row orders.
pub struct ShuffleFrame {
    inner: Arc<dyn DataFrame>,
    permutation: Vec<usize>,
}

impl ShuffleFrame {
    pub fn new(inner: Arc<dyn DataFrame>, seed: u64) -> Self {
        let mut permutation: Vec<usize> = (0..inner.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        permutation.shuffle(&mut rng);

        Self { inner, permutation }
    }
}

impl DataFrame for ShuffleFrame {
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
        self.inner.scalar(column, self.permutation[row])
    }

    fn column(&self, column: &str) -> Result<Array1<f32>> {
        let values = self.inner.column(column)?;
        Ok(self.permutation.iter().map(|&i| values[i]).collect())
    }

    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>> {
        self.inner.vlarr(column, self.permutation[row])
    }
}
