//! Sample-weight computation from a target distribution.
//!
//! Flat weighting inverts a 1-D histogram of a reference variable so that
//! the weighted distribution of that variable becomes approximately
//! uniform. The computation is a pure function of the values and the
//! binning; no RNG is involved.

use crate::error::Error;
use anyhow::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Binning for [`flat_weights`], as it appears in persisted configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlatSpec {
    /// Column whose histogram should be flattened.
    #[serde(default = "default_var")]
    pub var: String,

    /// Number of uniform bins.
    #[serde(default = "default_bins")]
    pub bins: usize,

    /// Histogram range `(lower, upper)`.
    #[serde(default = "default_range")]
    pub range: (f32, f32),

    /// Optional cap on bin weights, as a multiple of the smallest bin
    /// weight. Bounds the weight variance in sparse regions.
    #[serde(default)]
    pub clip: Option<f64>,
}

fn default_var() -> String {
    "trueE".to_string()
}

fn default_bins() -> usize {
    50
}

fn default_range() -> (f32, f32) {
    (0.0, 5.0)
}

impl Default for FlatSpec {
    fn default() -> Self {
        Self {
            var: default_var(),
            bins: default_bins(),
            range: default_range(),
            clip: None,
        }
    }
}

/// Computes the normalized inverse histogram of `values`.
///
/// Bin counts get a Laplace `+1` so empty bins never divide by zero. If
/// `clip` is given, each inverted bin weight is capped at
/// `clip * min(inverted bin weights)`. The result sums to 1.
pub fn calc_flat_whist(
    values: &Array1<f32>,
    bins: usize,
    range: (f32, f32),
    clip: Option<f64>,
) -> Result<Vec<f64>> {
    let (lo, hi) = range;

    if bins == 0 {
        return Err(Error::config("Flat weighting needs at least one bin"));
    }

    if !(lo < hi) {
        return Err(Error::config(format!(
            "Invalid flat weighting range ({}, {})",
            lo, hi
        )));
    }

    let mut hist = vec![0u64; bins];
    for &v in values {
        // Out-of-range values are not counted, matching a plain histogram
        // over (lo, hi). The upper edge belongs to the last bin.
        if v >= lo && v <= hi {
            hist[bin_index(v, bins, range)] += 1;
        }
    }

    let mut whist: Vec<f64> = hist.iter().map(|&h| 1.0 / (h + 1) as f64).collect();

    if let Some(clip) = clip {
        let min_w = whist.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_w = clip * min_w;
        for w in whist.iter_mut() {
            if *w > max_w {
                *w = max_w;
            }
        }
    }

    let total: f64 = whist.iter().sum();
    for w in whist.iter_mut() {
        *w /= total;
    }

    Ok(whist)
}

/// Per-row weights that make the weighted histogram of `values` flat.
///
/// Values outside the range are clamped into the nearest edge bin --- no
/// rows are dropped. The returned weights are rescaled so that their sum
/// equals `values.len()` (mean weight 1).
pub fn flat_weights(
    values: &Array1<f32>,
    bins: usize,
    range: (f32, f32),
    clip: Option<f64>,
) -> Result<Array1<f32>> {
    let whist = calc_flat_whist(values, bins, range, clip)?;

    let mut weights: Vec<f64> = values
        .iter()
        .map(|&v| whist[bin_index(v, bins, range)])
        .collect();

    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        let scale = values.len() as f64 / total;
        for w in weights.iter_mut() {
            *w *= scale;
        }
    }

    Ok(weights.into_iter().map(|w| w as f32).collect())
}

/// Convenience wrapper applying a [`FlatSpec`].
pub fn flat_weights_from_spec(values: &Array1<f32>, spec: &FlatSpec) -> Result<Array1<f32>> {
    flat_weights(values, spec.bins, spec.range, spec.clip)
}

// Uniform-bin index with out-of-range values clamped into the edge bins.
fn bin_index(value: f32, bins: usize, range: (f32, f32)) -> usize {
    let (lo, hi) = range;
    let width = (hi as f64 - lo as f64) / bins as f64;
    let pos = ((value as f64 - lo as f64) / width).floor();

    if pos < 0.0 {
        0
    } else {
        (pos as usize).min(bins - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn skewed_values() -> Array1<f32> {
        // 8 values in [0, 1), 2 in [1, 2)
        arr1(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 1.2, 1.7])
    }

    #[test]
    fn test_weights_sum_to_row_count() -> Result<()> {
        let values = skewed_values();
        let weights = flat_weights(&values, 2, (0.0, 2.0), None)?;

        let total: f32 = weights.sum();
        assert_relative_eq!(total, values.len() as f32, epsilon = 1e-4);
        assert!(weights.iter().all(|&w| w >= 0.0));
        Ok(())
    }

    #[test]
    fn test_weights_flatten_distribution() -> Result<()> {
        let values = skewed_values();
        let weights = flat_weights(&values, 2, (0.0, 2.0), None)?;

        // Weighted bin masses should be close to equal.
        let mass_low: f32 = values
            .iter()
            .zip(weights.iter())
            .filter(|(v, _)| **v < 1.0)
            .map(|(_, w)| *w)
            .sum();
        let mass_high: f32 = weights.sum() - mass_low;

        // With Laplace regularization the masses are 8/9 vs 2/3 of perfect
        // flatness; they must at least be far closer than the raw 8:2 ratio.
        assert!((mass_low / mass_high) < 2.0);
        Ok(())
    }

    #[test]
    fn test_clip_bounds_weight_ratio() -> Result<()> {
        let values = skewed_values();

        for clip in [1.0, 1.5, 2.0] {
            let weights = flat_weights(&values, 2, (0.0, 2.0), Some(clip))?;
            let min_w = weights.iter().cloned().fold(f32::INFINITY, f32::min);
            let max_w = weights.iter().cloned().fold(0.0f32, f32::max);
            assert!(max_w <= clip as f32 * min_w * (1.0 + 1e-5));
        }
        Ok(())
    }

    #[test]
    fn test_out_of_range_clamped_into_edge_bins() -> Result<()> {
        let values = arr1(&[-10.0, 0.5, 1.5, 10.0]);
        let weights = flat_weights(&values, 2, (0.0, 2.0), None)?;

        // Underflow shares the first bin's weight, overflow the last one's.
        assert_relative_eq!(weights[0], weights[1]);
        assert_relative_eq!(weights[2], weights[3]);
        assert_relative_eq!(weights.sum(), 4.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_deterministic() -> Result<()> {
        let values = skewed_values();
        let a = flat_weights(&values, 5, (0.0, 2.0), Some(3.0))?;
        let b = flat_weights(&values, 5, (0.0, 2.0), Some(3.0))?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_degenerate_binning_rejected() {
        let values = arr1(&[1.0]);
        assert!(flat_weights(&values, 0, (0.0, 1.0), None).is_err());
        assert!(flat_weights(&values, 5, (1.0, 1.0), None).is_err());
    }
}
