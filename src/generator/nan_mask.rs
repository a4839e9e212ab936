//! Decorator replacing non-finite batch values with the mask value.

use crate::consts::DEF_MASK;
use crate::dataset::Dataset;
use crate::generator::batch::{Batch, BatchArray};
use crate::generator::BatchGenerator;
use anyhow::Result;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rewrites every NaN or infinity in a batch's inputs and targets to
/// [`DEF_MASK`]. Weights pass through untouched.
pub struct NanMaskGenerator<G> {
    inner: G,
}

impl<G: BatchGenerator> NanMaskGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

impl<G: BatchGenerator> BatchGenerator for NanMaskGenerator<G> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get_batch(&self, index: usize) -> Result<Batch> {
        let mut batch = self.inner.get_batch(index)?;

        for array in batch.inputs.values_mut() {
            match array {
                BatchArray::Scalar(a) => mask(a.as_slice_mut()),
                BatchArray::Vlarr(a) => mask(a.as_slice_mut()),
            }
        }

        for target in batch.targets.values_mut() {
            mask(target.as_slice_mut());
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

fn mask(values: Option<&mut [f32]>) {
    // Collated arrays are freshly built in standard layout.
    if let Some(values) = values {
        for value in values {
            if !value.is_finite() {
                *value = DEF_MASK;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array3};

    struct Fixed {
        dataset: Arc<Dataset>,
        weights: BTreeMap<String, Array1<f32>>,
        inputs: Vec<String>,
        targets: Vec<String>,
    }

    impl Fixed {
        fn new() -> Self {
            use crate::frame::{DataFrame, DictFrame, Split};

            let frame: Arc<dyn DataFrame> = Arc::new(
                DictFrame::default()
                    .with_scalar("trueE", arr1(&[1.0]))
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

            Self {
                dataset,
                weights: BTreeMap::from([("total".to_string(), arr1(&[1.0]))]),
                inputs: vec!["input_slice".to_string()],
                targets: vec!["total".to_string()],
            }
        }
    }

    impl BatchGenerator for Fixed {
        fn len(&self) -> usize {
            1
        }

        fn get_batch(&self, _index: usize) -> Result<Batch> {
            let mut vlarr = Array3::zeros((1, 2, 2));
            vlarr[[0, 1, 0]] = f32::INFINITY;

            Ok(Batch {
                inputs: BTreeMap::from([
                    (
                        "input_slice".to_string(),
                        BatchArray::Scalar(arr2(&[[1.0, f32::NAN]])),
                    ),
                    ("input_png3d".to_string(), BatchArray::Vlarr(vlarr)),
                ]),
                targets: BTreeMap::from([(
                    "total".to_string(),
                    arr2(&[[f32::NEG_INFINITY]]),
                )]),
                weights: self.weights.clone(),
            })
        }

        fn dataset(&self) -> &Arc<Dataset> {
            &self.dataset
        }

        fn weights(&self) -> &BTreeMap<String, Array1<f32>> {
            &self.weights
        }

        fn input_groups(&self) -> &[String] {
            &self.inputs
        }

        fn target_groups(&self) -> &[String] {
            &self.targets
        }
    }

    #[test]
    fn test_non_finite_values_masked() -> Result<()> {
        let generator = NanMaskGenerator::new(Fixed::new());
        let batch = generator.get_batch(0)?;

        match batch.input("input_slice")? {
            BatchArray::Scalar(a) => assert_eq!(a, &arr2(&[[1.0, 0.0]])),
            BatchArray::Vlarr(_) => panic!("expected scalar group"),
        }

        match batch.input("input_png3d")? {
            BatchArray::Vlarr(a) => assert_eq!(a[[0, 1, 0]], 0.0),
            BatchArray::Scalar(_) => panic!("expected vlarr group"),
        }

        assert_eq!(batch.target("total")?, &arr2(&[[0.0]]));
        Ok(())
    }
}
