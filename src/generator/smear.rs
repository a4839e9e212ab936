//! Decorator perturbing one input column for systematics studies.

use crate::consts::DEF_MASK;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::generator::batch::{Batch, BatchArray};
use crate::generator::BatchGenerator;
use crate::transforms::noise::{NoiseKind, Sampler};
use anyhow::Result;
use ndarray::{s, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Applies a random smear to a single input column after collation.
///
/// One value is drawn per row; for vlarr groups the draw is shared by all
/// real prong slots of that row, so a prong-correlated quantity stays
/// correlated after smearing. Prong slots whose whole feature vector
/// equals the mask value are treated as padding and left untouched, so a
/// smeared batch keeps its padding at the mask value. A real prong that
/// is entirely mask-valued is indistinguishable from padding and is
/// skipped too. The draw stream is seeded per batch index, which keeps
/// batches reproducible under out-of-order and concurrent evaluation.
pub struct SmearGenerator<G> {
    inner: G,
    group: String,
    column: usize,
    sampler: Sampler,
    relative: bool,
    seed: u64,
}

impl<G: BatchGenerator> SmearGenerator<G> {
    pub fn new(
        inner: G,
        group: impl Into<String>,
        column: &str,
        noise: &NoiseKind,
        relative: bool,
        seed: u64,
    ) -> Result<Self> {
        let group = group.into();
        let dataset = inner.dataset();

        let columns = dataset
            .scalar_groups()
            .get(&group)
            .or_else(|| dataset.vlarr_groups().get(&group))
            .ok_or_else(|| Error::config(format!("Unknown smear group '{}'", group)))?;

        let column = columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                Error::config(format!(
                    "Smear column '{}' not found in group '{}'",
                    column, group
                ))
            })?;

        if !inner.input_groups().contains(&group) {
            return Err(Error::config(format!(
                "Smear group '{}' is not an input group",
                group
            )));
        }

        let sampler = Sampler::new(noise)?;

        Ok(Self {
            inner,
            group,
            column,
            sampler,
            relative,
            seed,
        })
    }

    fn perturb(&self, value: f32, draw: f32) -> f32 {
        if self.relative {
            value * (1.0 + draw)
        } else {
            value + draw
        }
    }
}

impl<G: BatchGenerator> BatchGenerator for SmearGenerator<G> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get_batch(&self, index: usize) -> Result<Batch> {
        let mut batch = self.inner.get_batch(index)?;
        let mut rng = StdRng::seed_from_u64(
            self.seed
                .wrapping_add((index as u64) << 32)
                .wrapping_add(index as u64),
        );

        let array = batch
            .inputs
            .get_mut(&self.group)
            .ok_or_else(|| Error::batch(format!("Batch missing input group '{}'", self.group)))?;

        match array {
            BatchArray::Scalar(a) => {
                for mut row in a.rows_mut() {
                    let draw = self.sampler.draw(&mut rng);
                    row[self.column] = self.perturb(row[self.column], draw);
                }
            }
            BatchArray::Vlarr(a) => {
                let (n_rows, n_prongs, _) = a.dim();
                for r in 0..n_rows {
                    let draw = self.sampler.draw(&mut rng);
                    for p in 0..n_prongs {
                        // All-mask slots are padding and must stay at the
                        // mask value even under additive noise.
                        if a.slice(s![r, p, ..]).iter().all(|&v| v == DEF_MASK) {
                            continue;
                        }
                        let value = a[[r, p, self.column]];
                        a[[r, p, self.column]] = self.perturb(value, draw);
                    }
                }
            }
        }

        Ok(batch)
    }

    fn dataset(&self) -> &Arc<Dataset> {
        self.inner.dataset()
    }

    fn weights(&self) -> &BTreeMap<String, Array1<f32>> {
        self.inner.weights()
    }

    fn input_groups(&self) -> &[String] {
        self.inner.input_groups()
    }

    fn target_groups(&self) -> &[String] {
        self.inner.target_groups()
    }
}
