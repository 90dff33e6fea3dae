// src/post_process.rs

use crate::matmul::{adjoint, matmul, GramSide};
use crate::orthogonalizer::{complete_orthonormal_columns, orthogonalize_columns};
use crate::scalar::SvdScalar;
use crate::ThreadSafeStdError;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use num_traits::Float;
use std::cmp::Ordering;

/// The three factors assembled from the converged QR iteration.
#[derive(Debug, Clone)]
pub struct SvdFactors<T: SvdScalar> {
    /// Left singular vectors, `rows x rows`.
    pub u: Array2<T>,
    /// Diagonal factor, `rows x cols`.
    pub s: Array2<T>,
    /// Right singular vectors, `cols x cols`.
    pub v: Array2<T>,
    /// `s[i][i]` for `i < min(rows, cols)`, in the order the iteration produced them.
    pub singular_values: Array1<T::Real>,
}

/// Singular values `sqrt(|r[i][i]|)` for the first `count` diagonal entries of R.
///
/// The modulus is taken before the root; the Gram matrix is positive
/// semi-definite, so a negative diagonal can only be rounding noise.
pub fn singular_values_from_r<T: SvdScalar>(r: &ArrayView2<'_, T>, count: usize) -> Array1<T::Real> {
    Array1::from_shape_fn(count, |i| Float::sqrt(r[[i, i]].abs()))
}

/// Column order that moves the `rank` largest-modulus diagonal entries of R
/// to the front, each group kept in its original order.
///
/// When the iteration runs on the larger Gram matrix, `n - rank` of its
/// eigenvalues are zero and nothing guarantees they settle at the end of the
/// diagonal. Ties go to the lower index.
pub fn dominant_diagonal_order<T: SvdScalar>(r: &ArrayView2<'_, T>, rank: usize) -> Vec<usize> {
    let n = r.nrows().min(r.ncols());
    let keep = rank.min(n);
    let mut by_size: Vec<usize> = (0..n).collect();
    by_size.sort_by(|&i, &j| {
        r[[j, j]]
            .abs()
            .partial_cmp(&r[[i, i]].abs())
            .unwrap_or(Ordering::Equal)
    });
    let (leading, trailing) = by_size.split_at_mut(keep);
    leading.sort_unstable();
    trailing.sort_unstable();
    by_size
}

/// `rows x cols` matrix with `singular_values` on the diagonal and zeros elsewhere.
pub fn build_sigma<T: SvdScalar>(singular_values: &Array1<T::Real>, rows: usize, cols: usize) -> Array2<T> {
    let mut s = Array2::<T>::zeros((rows, cols));
    for (i, &value) in singular_values.iter().enumerate().take(rows.min(cols)) {
        s[[i, i]] = T::from_real(value);
    }
    s
}

/// Builds the factor the iteration did not accumulate.
///
/// `projector` is A (to derive U from V) or Aᴴ (to derive V from U) and
/// `known` the accumulated factor. Column i for `s_i > epsilon` is
/// `(projector · known)[:, i] / s_i`; every other column, including those
/// past `singular_values.len()`, is filled by orthonormal basis completion.
///
/// # Errors
/// Propagates multiply shape errors and basis completion failures.
pub fn derive_missing_factor<T: SvdScalar>(
    projector: &ArrayView2<'_, T>,
    known: &ArrayView2<'_, T>,
    singular_values: &Array1<T::Real>,
    epsilon: T::Real,
) -> Result<Array2<T>, ThreadSafeStdError> {
    let dim = projector.nrows();
    let product = matmul(projector, known)?;
    let mut derived = Array2::<T>::zeros((dim, dim));
    let mut present = vec![false; dim];

    for (i, &sigma) in singular_values.iter().enumerate().take(dim.min(product.ncols())) {
        if sigma > epsilon {
            let inv = sigma.recip();
            derived
                .column_mut(i)
                .assign(&product.column(i).mapv(|x| x.mul_real(inv)));
            present[i] = true;
        } else {
            debug!("Singular value {} ({:?}) is at or below epsilon; completing its column", i, sigma);
        }
    }

    complete_orthonormal_columns(&mut derived, &present)?;
    Ok(derived)
}

/// Turns the final R and the accumulated Q product into U, S and V.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor<T: SvdScalar> {
    epsilon: T::Real,
}

impl<T: SvdScalar> PostProcessor<T> {
    pub fn new(epsilon: T::Real) -> Self {
        Self { epsilon }
    }

    /// Assembles the factors for `a` from the iteration results.
    ///
    /// `side` must be the resolved Gram side the iteration ran on: for
    /// `Columns` the accumulated factor is V and U is derived, for `Rows` the
    /// accumulated factor is U and V is derived.
    ///
    /// # Errors
    /// Returns an error if the iteration matrices do not match the Gram
    /// dimension of `a`, or if a derived factor cannot be completed.
    pub fn run(
        &self,
        a: &ArrayView2<'_, T>,
        final_r: &ArrayView2<'_, T>,
        accumulated: Array2<T>,
        side: GramSide,
    ) -> Result<SvdFactors<T>, ThreadSafeStdError> {
        let (rows, cols) = a.dim();
        let side = side.resolve(rows, cols);
        let n = side.gram_dim(rows, cols);
        if final_r.dim() != (n, n) || accumulated.dim() != (n, n) {
            return Err(format!(
                "Post-processing a {}x{} input on side {:?} needs {}x{} iteration matrices, got R {:?} and factor {:?}",
                rows,
                cols,
                side,
                n,
                n,
                final_r.dim(),
                accumulated.dim()
            )
            .into());
        }
        let rank = rows.min(cols);

        let mut accumulated = accumulated;
        let singular_values = if n > rank {
            let order = dominant_diagonal_order(final_r, rank);
            debug!("Keeping diagonal entries {:?} of the {}x{} Gram iterate", &order[..rank], n, n);
            let permuted_r = final_r.select(Axis(0), &order).select(Axis(1), &order);
            accumulated = accumulated.select(Axis(1), &order);
            singular_values_from_r(&permuted_r.view(), rank)
        } else {
            singular_values_from_r(final_r, rank)
        };
        if singular_values.iter().any(|v| !v.is_finite()) {
            return Err("Singular values are not finite; the iteration diverged".into());
        }
        let s = build_sigma::<T>(&singular_values, rows, cols);

        // The accumulated factor only spans the larger dimension when the side was forced.
        if n > rank {
            debug!("Orthogonalizing accumulated {}x{} factor", n, n);
            orthogonalize_columns(&mut accumulated);
        }

        let (u, v) = match side {
            GramSide::Rows => {
                let a_h = adjoint(a);
                let mut v = derive_missing_factor(&a_h.view(), &accumulated.view(), &singular_values, self.epsilon)?;
                if cols > rank {
                    orthogonalize_columns(&mut v);
                }
                (accumulated, v)
            }
            _ => {
                let mut u = derive_missing_factor(a, &accumulated.view(), &singular_values, self.epsilon)?;
                if rows > rank {
                    orthogonalize_columns(&mut u);
                }
                (u, accumulated)
            }
        };

        let degenerate = singular_values.iter().filter(|&&v| v <= self.epsilon).count();
        if degenerate > 0 {
            warn!(
                "{} of {} singular values are at or below epsilon; their vectors come from basis completion",
                degenerate, rank
            );
        }

        Ok(SvdFactors {
            u,
            s,
            v,
            singular_values,
        })
    }
}
