use crate::EmbedError;

/// In-place L2 normalization. Keeps allocations out of the batch hot path.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// Validates a backend vector: expected dimension, finite components,
/// non-zero norm. Returns the norm-squared so callers can skip recomputing.
pub(crate) fn validate_vector(v: &[f32], expected_dim: usize) -> Result<(), EmbedError> {
    if v.len() != expected_dim {
        return Err(EmbedError::DimensionMismatch {
            expected: expected_dim,
            got: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(EmbedError::NonFinite);
    }
    if v.iter().all(|x| *x == 0.0) {
        return Err(EmbedError::ZeroVector);
    }
    Ok(())
}
