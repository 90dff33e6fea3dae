// src/diagnostics.rs

use crate::matmul::{adjoint, matmul, GramSide};
use crate::scalar::{real_to_f64, SvdScalar};
use crate::svd::SvdOutput;
use crate::ThreadSafeStdError;
use ndarray::ArrayView2;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Accuracy summary of one decomposition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SvdQualityReport {
    pub matrix_dims: (usize, usize),               // (rows, cols) of A
    pub gram_side: GramSide,                       // side the iteration ran on
    pub iterations: usize,
    pub forced_termination: bool,

    // --- Singular values ---
    pub singular_values: Vec<f64>,                 // sorted descending
    pub singular_value_max_abs_error: Option<f64>, // vs reference, both sorted descending
    pub singular_value_max_rel_error: Option<f64>, // |computed - ref| / |ref|, zero references skipped

    // --- Factors ---
    pub reconstruction_error_abs: f64,             // max |A - U S Vᴴ|
    pub reconstruction_error_rel: f64,             // abs error / max |A|
    pub u_orthogonality_error: f64,                // max |Uᴴ U - I|
    pub v_orthogonality_error: f64,                // max |Vᴴ V - I|
}

impl SvdQualityReport {
    /// `true` when the reconstruction and both factors are within `tolerance`
    /// (relative reconstruction error, absolute orthogonality error).
    pub fn within(&self, tolerance: f64) -> bool {
        self.reconstruction_error_rel <= tolerance
            && self.u_orthogonality_error <= tolerance
            && self.v_orthogonality_error <= tolerance
    }
}

/// Converts real values to `f64` and sorts them in descending order.
pub fn sorted_descending<R: ToPrimitive + Copy>(values: &[R]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().map(|&v| real_to_f64(v)).collect();
    out.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// Largest deviation of `mᴴ m` from the identity.
pub fn orthogonality_error<T: SvdScalar>(m: &ArrayView2<'_, T>) -> Result<f64, ThreadSafeStdError> {
    let gram = matmul(&adjoint(m).view(), m)?;
    let worst = gram
        .indexed_iter()
        .map(|((i, j), &x)| {
            let target = if i == j { T::one() } else { T::zero() };
            real_to_f64((x - target).abs())
        })
        .fold(0.0f64, f64::max);
    Ok(worst)
}

/// Returns `(max |A - U S Vᴴ|, that value / max |A|)`.
///
/// The relative error equals the absolute one when A is all zeros.
pub fn reconstruction_error<T: SvdScalar>(
    a: &ArrayView2<'_, T>,
    u: &ArrayView2<'_, T>,
    s: &ArrayView2<'_, T>,
    v: &ArrayView2<'_, T>,
) -> Result<(f64, f64), ThreadSafeStdError> {
    let us = matmul(u, s)?;
    let usv = matmul(&us.view(), &adjoint(v).view())?;
    if usv.dim() != a.dim() {
        return Err(format!("Reconstruction has shape {:?}, input has {:?}", usv.dim(), a.dim()).into());
    }
    let abs = usv
        .iter()
        .zip(a.iter())
        .map(|(&x, &y)| real_to_f64((x - y).abs()))
        .fold(0.0f64, f64::max);
    let scale = a.iter().map(|&x| real_to_f64(x.abs())).fold(0.0f64, f64::max);
    let rel = if scale > 0.0 { abs / scale } else { abs };
    Ok((abs, rel))
}

/// Compares computed singular values with a reference after sorting both in
/// descending order. Returns `(max abs difference, max relative difference)`.
pub fn singular_value_error(computed: &[f64], reference: &[f64]) -> Result<(f64, f64), ThreadSafeStdError> {
    if computed.len() != reference.len() {
        return Err(format!(
            "Cannot compare {} singular values with {} reference values",
            computed.len(),
            reference.len()
        )
        .into());
    }
    let computed = sorted_descending(computed);
    let reference = sorted_descending(reference);
    let mut max_abs = 0.0f64;
    let mut max_rel = 0.0f64;
    for (c, r) in computed.iter().zip(reference.iter()) {
        let diff = (c - r).abs();
        max_abs = max_abs.max(diff);
        if *r != 0.0 {
            max_rel = max_rel.max(diff / r.abs());
        }
    }
    Ok((max_abs, max_rel))
}

/// Builds the quality report for `output` as a decomposition of `a`,
/// optionally against known singular values.
pub fn assess<T: SvdScalar>(
    a: &ArrayView2<'_, T>,
    output: &SvdOutput<T>,
    reference: Option<&[f64]>,
) -> Result<SvdQualityReport, ThreadSafeStdError> {
    let singular_values = sorted_descending(&output.singular_values.to_vec());
    let (sv_abs, sv_rel) = match reference {
        Some(r) => {
            let (abs, rel) = singular_value_error(&singular_values, r)?;
            (Some(abs), Some(rel))
        }
        None => (None, None),
    };
    let (recon_abs, recon_rel) =
        reconstruction_error(a, &output.u.view(), &output.s.view(), &output.v.view())?;

    Ok(SvdQualityReport {
        matrix_dims: a.dim(),
        gram_side: output.gram_side,
        iterations: output.iterations,
        forced_termination: output.forced_termination,
        singular_values,
        singular_value_max_abs_error: sv_abs,
        singular_value_max_rel_error: sv_rel,
        reconstruction_error_abs: recon_abs,
        reconstruction_error_rel: recon_rel,
        u_orthogonality_error: orthogonality_error(&output.u.view())?,
        v_orthogonality_error: orthogonality_error(&output.v.view())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn orthogonality_of_rotation_is_zero() {
        let (c, s) = (0.6, 0.8);
        let q = array![[c, -s], [s, c]];
        assert_abs_diff_eq!(orthogonality_error(&q.view()).unwrap(), 0.0, epsilon = 1e-15);

        let skewed = array![[1.0, 0.5], [0.0, 1.0]];
        assert_abs_diff_eq!(orthogonality_error(&skewed.view()).unwrap(), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn reconstruction_error_is_relative_to_largest_entry() {
        let a = array![[4.0, 0.0], [0.0, 2.0]];
        let u = Array2::<f64>::eye(2);
        let v = Array2::<f64>::eye(2);
        let s = array![[4.0, 0.0], [0.0, 1.0]];
        let (abs, rel) = reconstruction_error(&a.view(), &u.view(), &s.view(), &v.view()).unwrap();
        assert_abs_diff_eq!(abs, 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(rel, 0.25, epsilon = 1e-15);
    }

    #[test]
    fn singular_value_error_sorts_before_comparing() {
        let (abs, rel) = singular_value_error(&[1.0, 3.0, 2.0], &[3.0, 2.0, 1.1]).unwrap();
        assert_abs_diff_eq!(abs, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(rel, 0.1 / 1.1, epsilon = 1e-12);
        assert!(singular_value_error(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = SvdQualityReport {
            matrix_dims: (4, 4),
            singular_values: vec![2.0, 1.0],
            ..Default::default()
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: SvdQualityReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.matrix_dims, (4, 4));
        assert_eq!(back.singular_values, vec![2.0, 1.0]);
        assert!(back.within(1e-12));
    }
}
