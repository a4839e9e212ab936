//! Energy label arithmetic around the `total = primary + secondary`
//! relation.
//!
//! Predictions and truth labels come in up to three flavors. When exactly
//! one of the three is absent it is implied by the other two; with zero
//! or two absent there is nothing to compute and the triple is returned
//! as-is.

use crate::consts::{LABEL_PRIMARY, LABEL_SECONDARY, LABEL_TOTAL};
use crate::error::Error;
use crate::generator::BatchGenerator;
use anyhow::Result;
use ndarray::Array1;
use std::collections::BTreeMap;

/// The three energy labels of one sample set, each optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnergyTriple {
    pub total: Option<Array1<f32>>,
    pub primary: Option<Array1<f32>>,
    pub secondary: Option<Array1<f32>>,
}

impl EnergyTriple {
    pub fn new(
        total: Option<Array1<f32>>,
        primary: Option<Array1<f32>>,
        secondary: Option<Array1<f32>>,
    ) -> Self {
        Self {
            total,
            primary,
            secondary,
        }
    }

    /// Completes the triple when exactly one label is missing.
    ///
    /// `total` is implied as `primary + secondary`; either summand is
    /// implied as `total` minus the other. Any other pattern of presence
    /// passes through unchanged.
    pub fn fill_missing(mut self) -> Result<Self> {
        let n_missing = [&self.total, &self.primary, &self.secondary]
            .iter()
            .filter(|label| label.is_none())
            .count();

        if n_missing != 1 {
            return Ok(self);
        }

        if self.total.is_none() {
            let (primary, secondary) = match (&self.primary, &self.secondary) {
                (Some(p), Some(s)) => (p, s),
                _ => unreachable!("exactly one label is missing"),
            };
            check_lengths(primary, secondary)?;
            self.total = Some(primary + secondary);
        } else if self.primary.is_none() {
            let (total, secondary) = match (&self.total, &self.secondary) {
                (Some(t), Some(s)) => (t, s),
                _ => unreachable!("exactly one label is missing"),
            };
            check_lengths(total, secondary)?;
            self.primary = Some(total - secondary);
        } else {
            let (total, primary) = match (&self.total, &self.primary) {
                (Some(t), Some(p)) => (t, p),
                _ => unreachable!("exactly one label is missing"),
            };
            check_lengths(total, primary)?;
            self.secondary = Some(total - primary);
        }

        Ok(self)
    }
}

fn check_lengths(a: &Array1<f32>, b: &Array1<f32>) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::batch(format!(
            "Energy label arrays disagree on length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Extracts the true energy labels of a generator's whole split, filling
/// in whichever of the three labels its targets do not carry.
pub fn true_energies(generator: &dyn BatchGenerator) -> Result<EnergyTriple> {
    let dataset = generator.dataset();

    let mut labels: BTreeMap<&str, Array1<f32>> = BTreeMap::new();
    for label in [LABEL_TOTAL, LABEL_PRIMARY, LABEL_SECONDARY] {
        if !generator.target_groups().iter().any(|g| g == label) {
            continue;
        }

        let columns = dataset
            .scalar_groups()
            .get(label)
            .ok_or_else(|| Error::config(format!("Target label '{}' has no columns", label)))?;

        if columns.len() != 1 {
            return Err(Error::config(format!(
                "Energy label '{}' must map to exactly one column, found {}",
                label,
                columns.len()
            )));
        }

        labels.insert(label, dataset.frame().column(&columns[0])?);
    }

    EnergyTriple::new(
        labels.remove(LABEL_TOTAL),
        labels.remove(LABEL_PRIMARY),
        labels.remove(LABEL_SECONDARY),
    )
    .fill_missing()
}

/// Assembles a completed triple from externally produced predictions,
/// keyed by energy label name.
pub fn base_energies(predictions: &BTreeMap<String, Array1<f32>>) -> Result<EnergyTriple> {
    EnergyTriple::new(
        predictions.get(LABEL_TOTAL).cloned(),
        predictions.get(LABEL_PRIMARY).cloned(),
        predictions.get(LABEL_SECONDARY).cloned(),
    )
    .fill_missing()
}
