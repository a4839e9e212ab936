//! Random perturbation of configured columns.
//!
//! Noise draws come from the row's private random stream, so the same row
//! under the same dataset seed always receives the same perturbation, no
//! matter which worker fetches it or in what order.

use crate::error::Error;
use crate::row::Row;
use anyhow::Result;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The distribution a noise draw is sampled from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case", deny_unknown_fields)]
pub enum NoiseKind {
    Gaussian {
        mu: f32,
        sigma: f32,
    },
    Uniform {
        low: f32,
        high: f32,
    },
    Discrete {
        values: Vec<f32>,
        #[serde(default)]
        probs: Option<Vec<f32>>,
    },
}

/// Configuration of one noise transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseSpec {
    pub noise: NoiseKind,

    /// One draw per row, shared by all affected columns. Otherwise each
    /// affected column gets its own draw.
    #[serde(default)]
    pub correlated: bool,

    /// Multiply by `1 + draw` instead of adding the draw.
    #[serde(default)]
    pub relative: bool,

    /// Affected scalar columns, per scalar group.
    #[serde(default)]
    pub scalar_groups: Option<BTreeMap<String, Vec<String>>>,

    /// Affected vlarr columns, per vlarr group.
    #[serde(default)]
    pub vlarr_groups: Option<BTreeMap<String, Vec<String>>>,
}

// Sampler with its parameters validated and prepared up front.
#[derive(Clone, Debug)]
pub(crate) enum Sampler {
    Gaussian(Normal<f32>),
    Uniform { low: f32, high: f32 },
    Discrete { values: Vec<f32>, index: Option<WeightedIndex<f32>> },
}

impl Sampler {
    pub(crate) fn new(kind: &NoiseKind) -> Result<Self> {
        match kind {
            NoiseKind::Gaussian { mu, sigma } => {
                let normal = Normal::new(*mu, *sigma).map_err(|err| {
                    Error::config(format!(
                        "Bad gaussian noise parameters mu={}, sigma={}: {}",
                        mu, sigma, err
                    ))
                })?;
                Ok(Sampler::Gaussian(normal))
            }

            NoiseKind::Uniform { low, high } => {
                if !(low < high) {
                    return Err(Error::config(format!(
                        "Bad uniform noise range [{}, {})",
                        low, high
                    )));
                }
                Ok(Sampler::Uniform {
                    low: *low,
                    high: *high,
                })
            }

            NoiseKind::Discrete { values, probs } => {
                if values.is_empty() {
                    return Err(Error::config("Discrete noise needs at least one value"));
                }

                let index = match probs {
                    None => None,
                    Some(probs) => {
                        if probs.len() != values.len() {
                            return Err(Error::config(format!(
                                "Discrete noise has {} values but {} probabilities",
                                values.len(),
                                probs.len()
                            )));
                        }
                        Some(WeightedIndex::new(probs.iter().copied()).map_err(|err| {
                            Error::config(format!("Bad discrete noise probabilities: {}", err))
                        })?)
                    }
                };

                Ok(Sampler::Discrete {
                    values: values.clone(),
                    index,
                })
            }
        }
    }

    pub(crate) fn draw(&self, rng: &mut StdRng) -> f32 {
        match self {
            Sampler::Gaussian(normal) => normal.sample(rng),
            Sampler::Uniform { low, high } => rng.random_range(*low..*high),
            Sampler::Discrete { values, index } => {
                let i = match index {
                    Some(weighted) => weighted.sample(rng),
                    None => rng.random_range(0..values.len()),
                };
                values[i]
            }
        }
    }
}

/// A noise transform with group/column references resolved to indices.
#[derive(Debug)]
pub(crate) struct CompiledNoise {
    sampler: Sampler,
    correlated: bool,
    relative: bool,
    // (group, affected column indices), in configuration order.
    scalar_targets: Vec<(String, Vec<usize>)>,
    vlarr_targets: Vec<(String, Vec<usize>)>,
}

pub(crate) fn compile_noise(
    spec: &NoiseSpec,
    scalar_groups: &BTreeMap<String, Vec<String>>,
    vlarr_groups: &BTreeMap<String, Vec<String>>,
) -> Result<CompiledNoise> {
    let resolve = |targets: &Option<BTreeMap<String, Vec<String>>>,
                   groups: &BTreeMap<String, Vec<String>>,
                   kind: &str|
     -> Result<Vec<(String, Vec<usize>)>> {
        let mut resolved = Vec::new();

        for (group, columns) in targets.iter().flatten() {
            let known = groups.get(group).ok_or_else(|| {
                Error::config(format!("Noise references unknown {} group '{}'", kind, group))
            })?;

            let indices = columns
                .iter()
                .map(|column| {
                    known.iter().position(|c| c == column).ok_or_else(|| {
                        Error::config(format!(
                            "Noise column '{}' not in {} group '{}'",
                            column, kind, group
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            resolved.push((group.clone(), indices));
        }

        Ok(resolved)
    };

    Ok(CompiledNoise {
        sampler: Sampler::new(&spec.noise)?,
        correlated: spec.correlated,
        relative: spec.relative,
        scalar_targets: resolve(&spec.scalar_groups, scalar_groups, "scalar")?,
        vlarr_targets: resolve(&spec.vlarr_groups, vlarr_groups, "vlarr")?,
    })
}

impl CompiledNoise {
    pub(crate) fn apply(&self, row: &mut Row, rng: &mut StdRng) -> Result<()> {
        let shared = if self.correlated {
            Some(self.sampler.draw(rng))
        } else {
            None
        };

        for (group, columns) in &self.scalar_targets {
            let values = row
                .scalars
                .get_mut(group)
                .ok_or_else(|| Error::batch(format!("Scalar group '{}' missing", group)))?;

            for &c in columns {
                let draw = shared.unwrap_or_else(|| self.sampler.draw(rng));
                values[c] = self.perturb(values[c], draw);
            }
        }

        for (group, columns) in &self.vlarr_targets {
            let matrix = row
                .vlarrs
                .get_mut(group)
                .ok_or_else(|| Error::batch(format!("Vlarr group '{}' missing", group)))?;

            for &c in columns {
                // One draw per column, broadcast down the prong axis. The
                // draw happens even for zero-prong rows so the random
                // stream stays aligned across rows.
                let draw = shared.unwrap_or_else(|| self.sampler.draw(rng));
                matrix
                    .column_mut(c)
                    .mapv_inplace(|x| self.perturb(x, draw));
            }
        }

        Ok(())
    }

    fn perturb(&self, value: f32, draw: f32) -> f32 {
        if self.relative {
            value * (1.0 + draw)
        } else {
            value + draw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};
    use rand::SeedableRng;

    fn groups() -> (BTreeMap<String, Vec<String>>, BTreeMap<String, Vec<String>>) {
        let scalar = BTreeMap::from([(
            "input_slice".to_string(),
            vec!["calE".to_string(), "nHit".to_string()],
        )]);
        let vlarr = BTreeMap::from([(
            "input_png3d".to_string(),
            vec!["png.calE".to_string(), "png.len".to_string()],
        )]);
        (scalar, vlarr)
    }

    fn make_row() -> Row {
        Row::new()
            .with_scalar("input_slice", arr1(&[2.0, 4.0]))
            .with_vlarr("input_png3d", arr2(&[[1.0, 10.0], [2.0, 20.0]]))
    }

    fn spec(kind: NoiseKind, correlated: bool, relative: bool) -> NoiseSpec {
        NoiseSpec {
            noise: kind,
            correlated,
            relative,
            scalar_groups: Some(BTreeMap::from([(
                "input_slice".to_string(),
                vec!["calE".to_string()],
            )])),
            vlarr_groups: Some(BTreeMap::from([(
                "input_png3d".to_string(),
                vec!["png.calE".to_string()],
            )])),
        }
    }

    #[test]
    fn test_correlated_relative_noise_shares_one_draw() -> Result<()> {
        let (scalar, vlarr) = groups();
        let spec = spec(
            NoiseKind::Uniform {
                low: 0.1,
                high: 0.5,
            },
            true,
            true,
        );
        let noise = compile_noise(&spec, &scalar, &vlarr)?;

        let mut row = make_row();
        noise.apply(&mut row, &mut StdRng::seed_from_u64(3))?;

        // All affected values scale by the same 1 + draw factor.
        let factor = row.scalars["input_slice"][0] / 2.0;
        assert!(factor > 1.1 && factor < 1.5);
        assert_relative_eq!(row.vlarrs["input_png3d"][[0, 0]], factor, epsilon = 1e-6);
        assert_relative_eq!(
            row.vlarrs["input_png3d"][[1, 0]],
            2.0 * factor,
            epsilon = 1e-6
        );

        // Unaffected columns stay untouched.
        assert_eq!(row.scalars["input_slice"][1], 4.0);
        assert_eq!(row.vlarrs["input_png3d"][[0, 1]], 10.0);
        Ok(())
    }

    #[test]
    fn test_additive_discrete_noise() -> Result<()> {
        let (scalar, vlarr) = groups();
        let spec = spec(
            NoiseKind::Discrete {
                values: vec![100.0],
                probs: None,
            },
            false,
            false,
        );
        let noise = compile_noise(&spec, &scalar, &vlarr)?;

        let mut row = make_row();
        noise.apply(&mut row, &mut StdRng::seed_from_u64(5))?;

        assert_eq!(row.scalars["input_slice"][0], 102.0);
        assert_eq!(row.vlarrs["input_png3d"][[0, 0]], 101.0);
        assert_eq!(row.vlarrs["input_png3d"][[1, 0]], 102.0);
        Ok(())
    }

    #[test]
    fn test_same_rng_state_same_noise() -> Result<()> {
        let (scalar, vlarr) = groups();
        let spec = spec(
            NoiseKind::Gaussian {
                mu: 0.0,
                sigma: 0.3,
            },
            false,
            true,
        );
        let noise = compile_noise(&spec, &scalar, &vlarr)?;

        let mut a = make_row();
        let mut b = make_row();
        noise.apply(&mut a, &mut StdRng::seed_from_u64(9))?;
        noise.apply(&mut b, &mut StdRng::seed_from_u64(9))?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_bad_parameters_fail_at_compile_time() {
        let (scalar, vlarr) = groups();

        for kind in [
            NoiseKind::Gaussian {
                mu: 0.0,
                sigma: -1.0,
            },
            NoiseKind::Uniform {
                low: 1.0,
                high: 1.0,
            },
            NoiseKind::Discrete {
                values: vec![],
                probs: None,
            },
            NoiseKind::Discrete {
                values: vec![1.0, 2.0],
                probs: Some(vec![1.0]),
            },
        ] {
            let spec = spec(kind, false, false);
            let err = compile_noise(&spec, &scalar, &vlarr).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_unknown_noise_column_fails() {
        let (scalar, vlarr) = groups();
        let mut spec = spec(
            NoiseKind::Uniform {
                low: 0.0,
                high: 1.0,
            },
            false,
            false,
        );
        spec.scalar_groups = Some(BTreeMap::from([(
            "input_slice".to_string(),
            vec!["missing".to_string()],
        )]));

        assert!(compile_noise(&spec, &scalar, &vlarr).is_err());
    }
}
