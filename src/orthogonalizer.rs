// src/orthogonalizer.rs

use crate::matmul::PARALLEL_ELEMENT_THRESHOLD;
use crate::scalar::SvdScalar;
use crate::ThreadSafeStdError;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayViewMut1, Axis};
use num_traits::{Float, One, Zero};
use rayon::prelude::*;

/// Conjugate inner product `<a, b> = Σ conj(a_k) · b_k`.
fn inner<T: SvdScalar>(a: &ArrayView1<'_, T>, b: &ArrayView1<'_, T>) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (x, y)| acc + x.conj() * *y)
}

fn norm<T: SvdScalar>(v: &ArrayView1<'_, T>) -> T::Real {
    v.iter()
        .fold(T::Real::zero(), |acc, x| acc + x.square())
        .sqrt()
}

/// Removes the component along unit vector `q` from `target`.
fn project_out<T: SvdScalar>(q: &ArrayView1<'_, T>, mut target: ArrayViewMut1<'_, T>) {
    let coeff = inner(q, &target.view());
    target.scaled_add(-coeff, q);
}

/// Columns whose norm falls to this level are treated as numerically zero.
fn zero_norm_tolerance<T: SvdScalar>(m: &Array2<T>) -> T::Real {
    let largest = m
        .axis_iter(Axis(1))
        .map(|c| norm(&c))
        .fold(T::Real::zero(), |acc, n| if n > acc { n } else { acc });
    let rows = T::real(m.nrows().max(1) as f64);
    T::Real::epsilon() * rows * largest
}

/// Modified Gram-Schmidt over the columns of `m`, in place.
///
/// Column i is normalised and its projection (conjugate inner product) removed
/// from every later column. A column whose remaining norm is numerically zero
/// is left as it is and reported with `warn!`; the input is then rank deficient
/// and the result is not fully orthonormal. Applying the routine to a matrix
/// with orthonormal columns leaves it unchanged up to rounding.
pub fn orthogonalize_columns<T: SvdScalar>(m: &mut Array2<T>) {
    let (rows, cols) = m.dim();
    if rows == 0 || cols == 0 {
        return;
    }
    let tolerance = zero_norm_tolerance(m);
    let parallel = rows * cols >= PARALLEL_ELEMENT_THRESHOLD;

    for i in 0..cols {
        let n = norm(&m.column(i));
        if n <= tolerance {
            warn!(
                "Gram-Schmidt: column {} of {}x{} matrix has numerically zero norm ({:?}); leaving it untouched",
                i, rows, cols, n
            );
            continue;
        }
        let inv = n.recip();
        m.column_mut(i).mapv_inplace(|x| x.mul_real(inv));
        if i + 1 == cols {
            break;
        }

        let q = m.column(i).to_owned();
        let mut trailing = m.slice_mut(s![.., i + 1..]);
        if parallel {
            trailing
                .axis_iter_mut(Axis(1))
                .into_par_iter()
                .for_each(|col| project_out(&q.view(), col));
        } else {
            for col in trailing.axis_iter_mut(Axis(1)) {
                project_out(&q.view(), col);
            }
        }
    }
}

/// Replaces the columns of `m` not flagged in `present` with unit vectors
/// orthogonal to the present columns and to each other.
///
/// Each replacement is the canonical basis vector with the largest residual
/// after projecting out the current basis, re-projected once more and
/// normalised. Ties go to the lowest index, so the result is deterministic.
///
/// # Errors
/// Returns an error if `present` does not have one flag per column, or if the
/// requested columns cannot all be completed within the row space.
pub fn complete_orthonormal_columns<T: SvdScalar>(
    m: &mut Array2<T>,
    present: &[bool],
) -> Result<(), ThreadSafeStdError> {
    let (rows, cols) = m.dim();
    if present.len() != cols {
        return Err(format!(
            "Basis completion needs one presence flag per column: {} flags for {} columns",
            present.len(),
            cols
        )
        .into());
    }
    let missing = present.iter().filter(|p| !**p).count();
    if missing == 0 {
        return Ok(());
    }

    // Orthonormal copy of the present columns; `m` keeps them unchanged.
    let present_idx: Vec<usize> = (0..cols).filter(|&j| present[j]).collect();
    let mut basis_matrix = m.select(Axis(1), &present_idx);
    orthogonalize_columns(&mut basis_matrix);
    let tolerance = T::real(0.5);
    let mut basis: Vec<Array1<T>> = basis_matrix
        .axis_iter(Axis(1))
        .filter(|c| (norm(c) - T::Real::one()).abs() < tolerance)
        .map(|c| c.to_owned())
        .collect();

    if basis.len() + missing > rows {
        return Err(format!(
            "Cannot complete {} columns: only {} of {} dimensions remain free",
            missing,
            rows - basis.len().min(rows),
            rows
        )
        .into());
    }

    for j in (0..cols).filter(|&j| !present[j]) {
        // residual norm² of e_k is 1 - Σ_b |b_k|²
        let mut best_k = 0;
        let mut best_residual = T::Real::neg_infinity();
        for k in 0..rows {
            let captured = basis
                .iter()
                .fold(T::Real::zero(), |acc, b| acc + b[k].square());
            let residual = T::Real::one() - captured;
            if residual > best_residual {
                best_residual = residual;
                best_k = k;
            }
        }

        let mut candidate = Array1::<T>::zeros(rows);
        candidate[best_k] = T::one();
        for _pass in 0..2 {
            for b in &basis {
                project_out(&b.view(), candidate.view_mut());
            }
        }
        let n = norm(&candidate.view());
        if n <= T::Real::epsilon() {
            return Err(format!("Basis completion for column {} found no independent direction", j).into());
        }
        candidate.mapv_inplace(|x| x.mul_real(n.recip()));
        debug!("Completed column {} with canonical direction e_{}", j, best_k);

        m.column_mut(j).assign(&candidate);
        basis.push(candidate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use num_complex::Complex;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn max_gram_deviation<T: SvdScalar>(m: &Array2<T>) -> f64 {
        let cols = m.ncols();
        let mut worst = 0.0f64;
        for i in 0..cols {
            for j in 0..cols {
                let dot = inner(&m.column(i), &m.column(j));
                let target = if i == j { T::one() } else { T::zero() };
                let dev = crate::scalar::real_to_f64((dot - target).abs());
                worst = worst.max(dev);
            }
        }
        worst
    }

    #[test]
    fn orthonormalizes_random_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut m = Array2::<f64>::random_using((12, 7), Uniform::new(-1.0, 1.0), &mut rng);
        orthogonalize_columns(&mut m);
        assert!(max_gram_deviation(&m) < 1e-12);
    }

    #[test]
    fn idempotent_on_orthonormal_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut m = Array2::<f64>::random_using((6, 6), Uniform::new(-1.0, 1.0), &mut rng);
        orthogonalize_columns(&mut m);
        let once = m.clone();
        orthogonalize_columns(&mut m);
        for (a, b) in m.iter().zip(once.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn parallel_path_orthonormalizes_large_matrix() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut m = Array2::<f64>::random_using((160, 120), Uniform::new(-1.0, 1.0), &mut rng);
        orthogonalize_columns(&mut m);
        assert!(max_gram_deviation(&m) < 1e-10);
    }

    #[test]
    fn complex_columns_use_conjugate_inner_product() {
        let mut m = array![
            [Complex::new(1.0, 1.0), Complex::new(0.0, 2.0)],
            [Complex::new(0.5, -1.0), Complex::new(1.0, 0.0)],
            [Complex::new(0.0, 0.0), Complex::new(-1.0, 1.0)]
        ];
        orthogonalize_columns(&mut m);
        assert!(max_gram_deviation(&m) < 1e-12);
    }

    #[test]
    fn zero_column_is_left_untouched() {
        let mut m = array![[1.0, 2.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]];
        orthogonalize_columns(&mut m);
        // column 1 is parallel to column 0 and collapses to zero
        assert_abs_diff_eq!(m[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn completion_fills_missing_columns_orthonormally() {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let mut m = array![[s, 0.1, 0.1], [s, 0.1, 0.1], [0.0, 0.1, 0.1]];
        complete_orthonormal_columns(&mut m, &[true, false, false]).unwrap();
        assert!(max_gram_deviation(&m) < 1e-12);
        // the present column is not modified
        assert_abs_diff_eq!(m[[0, 0]], s, epsilon = 0.0);
        assert_abs_diff_eq!(m[[1, 0]], s, epsilon = 0.0);
    }

    #[test]
    fn completion_is_noop_when_everything_is_present() {
        let mut m = Array2::<f64>::eye(3);
        complete_orthonormal_columns(&mut m, &[true; 3]).unwrap();
        assert_eq!(m, Array2::<f64>::eye(3));
    }

    #[test]
    fn completion_rejects_bad_flags_and_overfull_requests() {
        let mut m = Array2::<f64>::eye(3);
        assert!(complete_orthonormal_columns(&mut m, &[true, false]).is_err());

        let mut wide = Array2::<f64>::zeros((2, 3));
        assert!(complete_orthonormal_columns(&mut wide, &[false, false, false]).is_err());
    }
}
