//! Frame view with derived columns.

use crate::frame::DataFrame;
use crate::weights::{flat_weights_from_spec, FlatSpec};
use anyhow::{Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a derived column is computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum VarSpec {
    /// Flat sample weights derived from the histogram of another column.
    #[serde(rename = "flat")]
    Flat(FlatSpec),
}

/// A view that extends its inner frame with computed scalar columns.
///
/// Derived columns are materialized eagerly at construction, so later
/// access is lock-free even under concurrent readers. A derived column
/// shadows an inner column of the same name.
pub struct VarFrame {
    inner: Arc<dyn DataFrame>,
    variables: BTreeMap<String, Array1<f32>>,
}

impl VarFrame {
    pub fn new(
        inner: Arc<dyn DataFrame>,
        variables: &BTreeMap<String, VarSpec>,
    ) -> Result<Self> {
        let mut computed = BTreeMap::new();

        for (column, spec) in variables {
            let values = match spec {
                VarSpec::Flat(spec) => {
                    let source = inner
                        .column(&spec.var)
                        .with_context(|| {
                            format!(
                                "Cannot compute flat weights '{}': missing source column",
                                column
                            )
                        })?;
                    flat_weights_from_spec(&source, spec)?
                }
            };

            computed.insert(column.clone(), values);
        }

        Ok(Self {
            inner,
            variables: computed,
        })
    }
}

impl DataFrame for VarFrame {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn scalar_names(&self) -> Vec<String> {
        let mut names = self.inner.scalar_names();
        for name in self.variables.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    fn vlarr_names(&self) -> Vec<String> {
        self.inner.vlarr_names()
    }

    fn scalar(&self, column: &str, row: usize) -> Result<f32> {
        if let Some(values) = self.variables.get(column) {
            return values
                .get(row)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("Row {} out of bounds for '{}'", row, column));
        }
        self.inner.scalar(column, row)
    }

    fn column(&self, column: &str) -> Result<Array1<f32>> {
        if let Some(values) = self.variables.get(column) {
            return Ok(values.clone());
        }
        self.inner.column(column)
    }

    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>> {
        self.inner.vlarr(column, row)
    }
}
