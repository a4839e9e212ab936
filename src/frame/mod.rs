//! Row-oriented sources of event records.
//!
//! A [`DataFrame`] exposes scalar columns (one value per row) and vlarr
//! columns (a variable-length array per row). Concrete sources:
//! - [`DictFrame`]: in-memory columns,
//! - [`CsvFrame`]: delimited-text file with packed vlarr cells.
//!
//! Frames compose through read-only views:
//! - [`VarFrame`] adds derived columns (e.g. flat sample weights),
//! - [`ShuffleFrame`] applies a seeded row permutation,
//! - [`train_test_split`] partitions rows into disjoint splits.
//!
//! Once constructed, a frame is never mutated; every wrapper holds its
//! inner frame behind `Arc` so views can be shared across worker threads.

pub mod csv;
pub mod dict;
pub mod shuffle;
pub mod split;
pub mod var;

pub use self::csv::CsvFrame;
pub use self::dict::DictFrame;
pub use self::shuffle::ShuffleFrame;
pub use self::split::{train_test_split, Split, SplitSize};
pub use self::var::{VarFrame, VarSpec};

use anyhow::{Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only access to a logical table of event records.
///
/// All implementations must be `Send + Sync`; batch workers read frames
/// concurrently without locks.
pub trait DataFrame: Send + Sync {
    /// Number of rows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all scalar columns.
    fn scalar_names(&self) -> Vec<String>;

    /// Names of all vlarr columns.
    fn vlarr_names(&self) -> Vec<String>;

    /// One scalar value.
    fn scalar(&self, column: &str, row: usize) -> Result<f32>;

    /// A whole scalar column, in row order.
    fn column(&self, column: &str) -> Result<Array1<f32>>;

    /// The variable-length values of one vlarr column for one row.
    fn vlarr(&self, column: &str, row: usize) -> Result<Array1<f32>>;

    fn has_scalar(&self, column: &str) -> bool {
        self.scalar_names().iter().any(|c| c == column)
    }

    fn has_vlarr(&self, column: &str) -> bool {
        self.vlarr_names().iter().any(|c| c == column)
    }
}

/// Declarative description of a frame source, round-tripped through the
/// persisted configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum FrameSpec {
    /// Columns stored inline in the configuration. Mostly used for small
    /// fixtures and tests.
    #[serde(rename = "dict-frame")]
    Dict {
        #[serde(default)]
        scalars: BTreeMap<String, Vec<f32>>,
        #[serde(default)]
        vlarrs: BTreeMap<String, Vec<Vec<f32>>>,
    },

    /// Delimited-text file, loaded fully into memory.
    #[serde(rename = "csv-mem-frame")]
    Csv { path: PathBuf },
}

/// Opens the frame a [`FrameSpec`] describes.
///
/// Relative CSV paths are resolved against `datadir` when given.
pub fn open_frame(spec: &FrameSpec, datadir: Option<&Path>) -> Result<Arc<dyn DataFrame>> {
    match spec {
        FrameSpec::Dict { scalars, vlarrs } => {
            let frame = DictFrame::from_columns(scalars.clone(), vlarrs.clone())?;
            Ok(Arc::new(frame))
        }
        FrameSpec::Csv { path } => {
            let path = match datadir {
                Some(dir) => dir.join(path),
                None => path.clone(),
            };
            let frame = CsvFrame::open(&path)
                .with_context(|| format!("Failed to load csv frame from '{}'", path.display()))?;
            Ok(Arc::new(frame))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_dict_frame_from_spec() -> Result<()> {
        let spec = FrameSpec::Dict {
            scalars: BTreeMap::from([("e".to_string(), vec![1.0, 2.0])]),
            vlarrs: BTreeMap::from([(
                "p".to_string(),
                vec![vec![0.1], vec![0.2, 0.3]],
            )]),
        };

        let frame = open_frame(&spec, None)?;
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.scalar("e", 1)?, 2.0);
        assert_eq!(frame.vlarr("p", 1)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_frame_spec_round_trip() -> Result<()> {
        let spec = FrameSpec::Csv {
            path: PathBuf::from("dataset.csv"),
        };

        let text = serde_json::to_string(&spec)?;
        assert!(text.contains("csv-mem-frame"));

        let back: FrameSpec = serde_json::from_str(&text)?;
        assert_eq!(back, spec);
        Ok(())
    }
}
