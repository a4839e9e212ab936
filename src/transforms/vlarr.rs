//! Prong-order transforms on vlarr matrices.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Returns `matrix` with its prong rows in a random order.
///
/// One permutation is drawn and applied to the whole matrix, so every
/// column of the group sees the same prong order.
pub(crate) fn shuffle_prongs(matrix: &Array2<f32>, rng: &mut StdRng) -> Array2<f32> {
    let mut order: Vec<usize> = (0..matrix.nrows()).collect();
    order.shuffle(rng);
    matrix.select(Axis(0), &order)
}

/// Returns `matrix` with its prong rows stably sorted by `column`.
///
/// Ties keep their original order, and NaN values sort after every finite
/// value via total ordering, keeping the result deterministic.
pub(crate) fn sort_prongs(matrix: &Array2<f32>, column: usize, ascending: bool) -> Array2<f32> {
    let keys = matrix.column(column);
    let mut order: Vec<usize> = (0..matrix.nrows()).collect();

    order.sort_by(|&a, &b| {
        let cmp = keys[a].total_cmp(&keys[b]);
        if ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });

    matrix.select(Axis(0), &order)
}
