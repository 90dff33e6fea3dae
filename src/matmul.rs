// src/matmul.rs

use crate::scalar::SvdScalar;
use crate::ThreadSafeStdError;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Output element count above which products are computed one output row per rayon task.
/// Below it the scheduling overhead dominates the small products typical of QR iteration.
pub const PARALLEL_ELEMENT_THRESHOLD: usize = 128 * 128;

/// Which Gram matrix the QR iteration runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GramSide {
    /// AᴴA when rows >= cols, AAᴴ otherwise (the smaller of the two).
    #[default]
    Auto,
    /// AᴴA (cols x cols); the accumulated factor is V.
    Columns,
    /// AAᴴ (rows x rows); the accumulated factor is U.
    Rows,
}

impl GramSide {
    /// Resolves `Auto` against the shape of A. Never returns `Auto`.
    pub fn resolve(self, rows: usize, cols: usize) -> GramSide {
        match self {
            GramSide::Auto => {
                if rows >= cols {
                    GramSide::Columns
                } else {
                    GramSide::Rows
                }
            }
            side => side,
        }
    }

    /// Dimension of the Gram matrix for an A of the given shape.
    pub fn gram_dim(self, rows: usize, cols: usize) -> usize {
        match self.resolve(rows, cols) {
            GramSide::Rows => rows,
            _ => cols,
        }
    }
}

/// Dense product `a · b`, rejecting inconsistent inner dimensions.
///
/// Large products are split by output row across the rayon pool; each row is
/// an independent vector-matrix product so results do not depend on the split.
pub fn matmul<T: SvdScalar>(
    a: &ArrayView2<'_, T>,
    b: &ArrayView2<'_, T>,
) -> Result<Array2<T>, ThreadSafeStdError> {
    let (a_rows, a_cols) = a.dim();
    let (b_rows, b_cols) = b.dim();
    if a_cols != b_rows {
        return Err(format!(
            "Illegal sizes for matrix multiplication: ({}x{}) · ({}x{})",
            a_rows, a_cols, b_rows, b_cols
        )
        .into());
    }

    if a_rows * b_cols < PARALLEL_ELEMENT_THRESHOLD {
        return Ok(a.dot(b));
    }

    let mut product = Array2::<T>::zeros((a_rows, b_cols));
    Zip::from(product.rows_mut())
        .and(a.rows())
        .par_for_each(|mut out_row, a_row| {
            out_row.assign(&a_row.dot(b));
        });
    Ok(product)
}

/// Conjugate transpose (plain transpose for real element types), as an owned,
/// standard-layout matrix.
pub fn adjoint<T: SvdScalar>(a: &ArrayView2<'_, T>) -> Array2<T> {
    let transposed = a.t();
    if T::is_complex() {
        transposed.mapv(|x| x.conj())
    } else {
        transposed.as_standard_layout().into_owned()
    }
}

/// Forms the Hermitian positive semi-definite Gram matrix of `a` for the
/// requested side (resolved against the shape of `a`).
pub fn gram_matrix<T: SvdScalar>(
    a: &ArrayView2<'_, T>,
    side: GramSide,
) -> Result<Array2<T>, ThreadSafeStdError> {
    let a_h = adjoint(a);
    match side.resolve(a.nrows(), a.ncols()) {
        GramSide::Rows => matmul(a, &a_h.view()),
        _ => matmul(&a_h.view(), a),
    }
}

/// n x n identity.
pub fn identity<T: SvdScalar>(n: usize) -> Array2<T> {
    Array2::eye(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use num_complex::Complex;

    #[test]
    fn matmul_matches_hand_computed_product() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let b = array![[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]];
        let c = matmul(&a.view(), &b.view()).unwrap();
        assert_eq!(c, array![[58.0, 64.0], [139.0, 154.0]]);
    }

    #[test]
    fn matmul_rejects_shape_mismatch() {
        let a = Array2::<f64>::zeros((3, 2));
        let b = Array2::<f64>::zeros((3, 2));
        let err = matmul(&a.view(), &b.view()).unwrap_err();
        assert!(err.to_string().contains("Illegal sizes"));
    }

    #[test]
    fn parallel_path_agrees_with_serial_dot() {
        let n = 160;
        let a = Array2::from_shape_fn((n, n), |(i, j)| ((i * 7 + j * 3) % 11) as f64 - 5.0);
        let b = Array2::from_shape_fn((n, n), |(i, j)| ((i + 2 * j) % 5) as f64 * 0.5);
        let parallel = matmul(&a.view(), &b.view()).unwrap();
        let serial = a.dot(&b);
        for (p, s) in parallel.iter().zip(serial.iter()) {
            assert_abs_diff_eq!(*p, *s, epsilon = 1e-9);
        }
    }

    #[test]
    fn gram_matrix_picks_smaller_side() {
        let a = Array2::from_shape_fn((5, 3), |(i, j)| (i + j) as f64);
        assert_eq!(gram_matrix(&a.view(), GramSide::Auto).unwrap().dim(), (3, 3));
        assert_eq!(gram_matrix(&a.t(), GramSide::Auto).unwrap().dim(), (3, 3));
        assert_eq!(gram_matrix(&a.view(), GramSide::Rows).unwrap().dim(), (5, 5));
    }

    #[test]
    fn complex_gram_matrix_is_hermitian_with_real_diagonal() {
        let a = array![
            [Complex::new(1.0, 2.0), Complex::new(0.5, -1.0)],
            [Complex::new(-3.0, 0.0), Complex::new(2.0, 2.0)],
            [Complex::new(0.0, 1.0), Complex::new(1.0, 0.0)]
        ];
        let g = gram_matrix(&a.view(), GramSide::Columns).unwrap();
        for i in 0..2 {
            assert_abs_diff_eq!(g[[i, i]].im, 0.0, epsilon = 1e-12);
            assert!(g[[i, i]].re > 0.0);
            for j in 0..2 {
                assert_abs_diff_eq!(g[[i, j]].re, g[[j, i]].re, epsilon = 1e-12);
                assert_abs_diff_eq!(g[[i, j]].im, -g[[j, i]].im, epsilon = 1e-12);
            }
        }
    }
}
