//! NaN/Inf masking at the row level.

use crate::consts::DEF_MASK;
use crate::row::Row;

/// Replaces every non-finite entry of every group with [`DEF_MASK`].
pub(crate) fn mask_non_finite(row: &mut Row) {
    for values in row.scalars.values_mut() {
        values.mapv_inplace(|x| if x.is_finite() { x } else { DEF_MASK });
    }

    for matrix in row.vlarrs.values_mut() {
        matrix.mapv_inplace(|x| if x.is_finite() { x } else { DEF_MASK });
    }
}
