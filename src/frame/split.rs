//! Disjoint train/validation/test partitions of a frame.
//!
//! Splitting is a pure partition of the (already shuffled) row order:
//! the tail of the frame becomes the test split, the rows before it the
//! validation split, and the remainder the training split. Randomization
//! comes from an upstream [`ShuffleFrame`](crate::frame::ShuffleFrame),
//! keeping the partition itself deterministic.

use crate::error::Error;
use crate::frame::DataFrame;
use anyhow::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three standard dataset splits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// Position of the split in a `[train, val, test]` frame list.
    pub fn index(self) -> usize {
        match self {
            Split::Train => 0,
            Split::Val => 1,
            Split::Test => 2,
        }
    }
}

/// Size of a split: an absolute row count, or a fraction of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitSize {
    Count(usize),
    Fraction(f64),
}

impl SplitSize {
    fn resolve(self, n_rows: usize) -> Result<usize> {
        let count = match self {
            SplitSize::Count(count) => count,
            SplitSize::Fraction(f) => {
                // An empty split is spelled by omitting the size, not by
                // a zero fraction.
                if !(f > 0.0 && f < 1.0) {
                    return Err(Error::config(format!(
                        "Fractional split size {} outside (0, 1)",
                        f
                    )));
                }
                (f * n_rows as f64).round() as usize
            }
        };

        if count > n_rows {
            return Err(Error::config(format!(
                "Split size {} exceeds frame length {}",
                count, n_rows
            )));
        }

        Ok(count)
    }
}

/// A contiguous read-only view over a range of frame rows.
pub struct SliceFrame {
    inner: Arc<dyn DataFrame>,
    start: usize,
    length: usize,
}

impl SliceFrame {
    fn new(inner: Arc<dyn DataFrame>, start: usize, length: usize) -> Self {
        Self {
            inner,
            start,
            length,
        }
    }

    fn map_row(&self, row: usize) -> Result<usize> {
        if row >= self.length {
            return Err(anyhow::anyhow!(
                "Row {} out of bounds for split of {} rows",
                row,
                self.length
            ));
        }
        Ok(self.start + row)
    }
}

impl DataFrame for SliceFrame {
    fn len(&self) -> usize {
        self.length
    }

    fn scalar_names(&self) -> Vec<String> {
        self.inner.scalar_names()
    }

    fn vlarr_names(&self) -> Vec<String> {
        self.inner.vlarr_names()
    }

    fn scalar(&self, column: &str, row: usize) -> Result<f32> {
        self.inner.scalar(column, self.map_row(row)?)
    }

    fn column(&self, column: &str) -> Result<Array1<f32>> {
        let full = self.inner.column(column)?;
        Ok(full
            .slice(ndarray::s![self.start..self.start + self.length])
            .to_owned())
    }

    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>> {
        self.inner.vlarr(column, self.map_row(row)?)
    }
}

/// Partitions `frame` into `[train, val, test]` views.
///
/// `None` for a size means an empty split. The three views are disjoint by
/// construction: test takes the last rows, validation the rows before it,
/// training everything that remains.
pub fn train_test_split(
    frame: Arc<dyn DataFrame>,
    val_size: Option<SplitSize>,
    test_size: Option<SplitSize>,
) -> Result<[Arc<dyn DataFrame>; 3]> {
    let n_rows = frame.len();

    let n_val = val_size.map(|s| s.resolve(n_rows)).transpose()?.unwrap_or(0);
    let n_test = test_size.map(|s| s.resolve(n_rows)).transpose()?.unwrap_or(0);

    if n_val + n_test > n_rows {
        return Err(Error::config(format!(
            "Splits of {} + {} rows exceed frame length {}",
            n_val, n_test, n_rows
        )));
    }

    let n_train = n_rows - n_val - n_test;

    Ok([
        Arc::new(SliceFrame::new(frame.clone(), 0, n_train)),
        Arc::new(SliceFrame::new(frame.clone(), n_train, n_val)),
        Arc::new(SliceFrame::new(frame, n_train + n_val, n_test)),
    ])
}
