//! Declarative per-row transforms.
//!
//! A transform chain is configured as an ordered list of [`TransformSpec`]
//! values and compiled against a dataset's group definitions before any
//! row is served. Compilation resolves every referenced group and column
//! and rejects anything unknown, so a malformed chain fails at dataset
//! construction rather than at batch time.
//!
//! The set of transforms is closed: adding one means adding a variant
//! here and a match arm in [`CompiledTransform::apply`], which the
//! compiler checks for exhaustiveness.

pub mod mask;
pub mod noise;
pub mod vlarr;

pub use noise::{NoiseKind, NoiseSpec};

use crate::row::Row;
use anyhow::Result;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use noise::CompiledNoise;

/// One step of a transform chain, as persisted in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case", deny_unknown_fields)]
pub enum TransformSpec {
    /// Replace NaN/Inf entries in every group with the mask value.
    MaskNan,

    /// Perturb configured columns with random noise.
    Noise(NoiseSpec),

    /// Randomly permute the prong order of one vlarr group.
    VlarrShuffle { vlarr_group: String },

    /// Stably sort the prongs of one vlarr group by a column's value.
    VlarrSort {
        vlarr_group: String,
        column: String,
        #[serde(default = "default_ascending")]
        ascending: bool,
    },
}

fn default_ascending() -> bool {
    true
}

/// A transform with all group and column references resolved.
#[derive(Debug)]
pub(crate) enum CompiledTransform {
    MaskNan,
    Noise(CompiledNoise),
    VlarrShuffle {
        group: String,
    },
    VlarrSort {
        group: String,
        column: usize,
        ascending: bool,
    },
}

impl CompiledTransform {
    /// Applies this transform in place.
    ///
    /// `rng` is the row's private random stream; a transform that needs no
    /// randomness leaves it untouched, so the draws of later steps do not
    /// depend on whether earlier deterministic steps ran.
    pub(crate) fn apply(&self, row: &mut Row, rng: &mut StdRng) -> Result<()> {
        match self {
            CompiledTransform::MaskNan => {
                mask::mask_non_finite(row);
                Ok(())
            }
            CompiledTransform::Noise(noise) => noise.apply(row, rng),
            CompiledTransform::VlarrShuffle { group } => {
                let matrix = row
                    .vlarrs
                    .get_mut(group)
                    .ok_or_else(|| Error::batch(format!("Vlarr group '{}' missing", group)))?;
                *matrix = vlarr::shuffle_prongs(matrix, rng);
                Ok(())
            }
            CompiledTransform::VlarrSort {
                group,
                column,
                ascending,
            } => {
                let matrix = row
                    .vlarrs
                    .get_mut(group)
                    .ok_or_else(|| Error::batch(format!("Vlarr group '{}' missing", group)))?;
                *matrix = vlarr::sort_prongs(matrix, *column, *ascending);
                Ok(())
            }
        }
    }
}

/// Resolves a transform chain against the dataset's group definitions.
///
/// Fails with a configuration error on any unknown group or column. This
/// is the fail-fast boundary of the row pipeline.
pub(crate) fn compile_transforms(
    specs: &[TransformSpec],
    scalar_groups: &BTreeMap<String, Vec<String>>,
    vlarr_groups: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<CompiledTransform>> {
    specs
        .iter()
        .map(|spec| compile_one(spec, scalar_groups, vlarr_groups))
        .collect()
}

fn compile_one(
    spec: &TransformSpec,
    scalar_groups: &BTreeMap<String, Vec<String>>,
    vlarr_groups: &BTreeMap<String, Vec<String>>,
) -> Result<CompiledTransform> {
    match spec {
        TransformSpec::MaskNan => Ok(CompiledTransform::MaskNan),

        TransformSpec::Noise(noise) => Ok(CompiledTransform::Noise(noise::compile_noise(
            noise,
            scalar_groups,
            vlarr_groups,
        )?)),

        TransformSpec::VlarrShuffle { vlarr_group } => {
            require_vlarr_group(vlarr_group, vlarr_groups)?;
            Ok(CompiledTransform::VlarrShuffle {
                group: vlarr_group.clone(),
            })
        }

        TransformSpec::VlarrSort {
            vlarr_group,
            column,
            ascending,
        } => {
            let columns = require_vlarr_group(vlarr_group, vlarr_groups)?;
            let column_index = columns.iter().position(|c| c == column).ok_or_else(|| {
                Error::config(format!(
                    "Sort column '{}' not in vlarr group '{}'",
                    column, vlarr_group
                ))
            })?;

            Ok(CompiledTransform::VlarrSort {
                group: vlarr_group.clone(),
                column: column_index,
                ascending: *ascending,
            })
        }
    }
}

fn require_vlarr_group<'a>(
    group: &str,
    vlarr_groups: &'a BTreeMap<String, Vec<String>>,
) -> Result<&'a Vec<String>> {
    vlarr_groups
        .get(group)
        .ok_or_else(|| Error::config(format!("Unknown vlarr group '{}'", group)))
}
