//! Decorator persisting every evaluated batch to disk.

use crate::dataset::Dataset;
use crate::error::Error;
use crate::generator::batch::Batch;
use crate::generator::BatchGenerator;
use anyhow::{Context, Result};
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Writes each batch it serves to `outdir/batch_{index}.json`.
///
/// Useful for auditing exactly what a training run saw. Files are
/// overwritten on re-evaluation; the directory is created up front so a
/// bad path fails at construction rather than mid-epoch.
pub struct BatchDumper<G> {
    inner: G,
    outdir: PathBuf,
}

impl<G: BatchGenerator> BatchDumper<G> {
    pub fn new(inner: G, outdir: impl Into<PathBuf>) -> Result<Self> {
        let outdir = outdir.into();
        fs::create_dir_all(&outdir)
            .with_context(|| format!("Failed to create dump directory {}", outdir.display()))?;

        Ok(Self { inner, outdir })
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    fn dump(&self, index: usize, batch: &Batch) -> Result<()> {
        let path = self.outdir.join(format!("batch_{}.json", index));
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        serde_json::to_writer(file, batch)
            .map_err(|e| Error::batch(format!("Failed to serialize batch {}: {}", index, e)))?;

        debug!(index, path = %path.display(), "Dumped batch");
        Ok(())
    }
}

impl<G: BatchGenerator> BatchGenerator for BatchDumper<G> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get_batch(&self, index: usize) -> Result<Batch> {
        let batch = self.inner.get_batch(index)?;
        self.dump(index, &batch)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DataFrame, DictFrame, Split};
    use crate::generator::DataGenerator;
    use ndarray::arr1;
    use tempfile::tempdir;

    fn make_generator() -> DataGenerator {
        let frame: Arc<dyn DataFrame> = Arc::new(
            DictFrame::default()
                .with_scalar("trueE", arr1(&[1.0, 2.0, 3.0]))
                .unwrap(),
        );
        let dataset = Arc::new(
            Dataset::from_frame(
                frame,
                false,
                Split::Train,
                BTreeMap::from([("total".to_string(), vec!["trueE".to_string()])]),
                BTreeMap::new(),
                BTreeMap::new(),
                &[],
                &[],
                0,
            )
            .unwrap(),
        );

        DataGenerator::new(dataset, vec![], vec!["total".to_string()], 2, None).unwrap()
    }

    #[test]
    fn test_batches_written_to_disk() -> Result<()> {
        let dir = tempdir()?;
        let dumper = BatchDumper::new(make_generator(), dir.path())?;

        for index in 0..dumper.len() {
            dumper.get_batch(index)?;
        }

        assert!(dir.path().join("batch_0.json").is_file());
        assert!(dir.path().join("batch_1.json").is_file());

        let text = fs::read_to_string(dir.path().join("batch_1.json"))?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert!(value["targets"]["total"].is_object());
        Ok(())
    }
}
