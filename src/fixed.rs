// src/fixed.rs

//! Entry point for matrices whose shape is known at compile time.
//!
//! Buffers are flat and column-major: element `(i, j)` of an `R x C` matrix
//! lives at index `i + j * R`. Shapes smaller than
//! [`MIN_MATRIX_DIM`](crate::MIN_MATRIX_DIM) in either direction are rejected
//! when the function is instantiated:
//!
//! ```compile_fail
//! use streaming_svd::{fixed::singular_value_decomposition, SvdConfig};
//! let a = [1.0f64; 4];
//! let (mut u, mut s, mut v) = ([0.0; 1], [0.0; 4], [0.0; 16]);
//! // a 1x4 input does not build
//! singular_value_decomposition::<1, 4, f64>(&a, &mut u, &mut s, &mut v, &SvdConfig::default()).unwrap();
//! ```

use crate::linalg_backends::{BackendQR, LinAlgBackendProvider};
use crate::scalar::SvdScalar;
use crate::svd::{StreamingSvd, SvdConfig};
use crate::{ThreadSafeStdError, MIN_MATRIX_DIM};
use ndarray::{Array2, ShapeBuilder};

struct ShapeCheck<const ROWS: usize, const COLS: usize>;

impl<const ROWS: usize, const COLS: usize> ShapeCheck<ROWS, COLS> {
    const VALID: () = assert!(
        ROWS >= MIN_MATRIX_DIM && COLS >= MIN_MATRIX_DIM,
        "SVD by QR iteration needs at least 2 rows and 2 columns"
    );
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<(), ThreadSafeStdError> {
    if len != expected {
        return Err(format!("Buffer `{}` has {} elements, expected {}", name, len, expected).into());
    }
    Ok(())
}

fn write_column_major<T: SvdScalar>(dst: &mut [T], src: &Array2<T>) {
    // iterating the transpose in logical order walks the source column by column
    for (d, s) in dst.iter_mut().zip(src.t().iter()) {
        *d = *s;
    }
}

/// Decomposer bound to a compile-time shape, holding its configuration and backend.
pub struct FixedShapeSvd<const ROWS: usize, const COLS: usize, T: SvdScalar, B = LinAlgBackendProvider<T>> {
    inner: StreamingSvd<T, B>,
}

impl<const ROWS: usize, const COLS: usize, T: SvdScalar> FixedShapeSvd<ROWS, COLS, T>
where
    LinAlgBackendProvider<T>: BackendQR<T>,
{
    pub fn new(config: SvdConfig) -> Self {
        Self::with_backend(config, LinAlgBackendProvider::new())
    }
}

impl<const ROWS: usize, const COLS: usize, T: SvdScalar, B: BackendQR<T>> FixedShapeSvd<ROWS, COLS, T, B> {
    pub fn with_backend(config: SvdConfig, backend: B) -> Self {
        let () = ShapeCheck::<ROWS, COLS>::VALID;
        Self {
            inner: StreamingSvd::with_backend(config, backend),
        }
    }

    /// Decomposes the column-major `a` (`ROWS·COLS` elements) into the
    /// column-major buffers `u` (`ROWS·ROWS`), `s` (`ROWS·COLS`) and `v`
    /// (`COLS·COLS`). Returns the number of iterations performed.
    ///
    /// # Errors
    /// Returns an error if a buffer has the wrong length, or for any error of
    /// [`StreamingSvd::decompose`]. The output buffers are untouched on error.
    pub fn decompose(&self, a: &[T], u: &mut [T], s: &mut [T], v: &mut [T]) -> Result<usize, ThreadSafeStdError> {
        let () = ShapeCheck::<ROWS, COLS>::VALID;
        check_len("a", a.len(), ROWS * COLS)?;
        check_len("u", u.len(), ROWS * ROWS)?;
        check_len("s", s.len(), ROWS * COLS)?;
        check_len("v", v.len(), COLS * COLS)?;

        let matrix = Array2::from_shape_vec((ROWS, COLS).f(), a.to_vec())?;
        let out = self.inner.decompose(&matrix)?;

        write_column_major(u, &out.u);
        write_column_major(s, &out.s);
        write_column_major(v, &out.v);
        Ok(out.iterations)
    }
}

/// One-shot decomposition of a `ROWS x COLS` column-major matrix with the
/// default backend. See [`FixedShapeSvd::decompose`] for the buffer layout.
pub fn singular_value_decomposition<const ROWS: usize, const COLS: usize, T>(
    a: &[T],
    u: &mut [T],
    s: &mut [T],
    v: &mut [T],
    config: &SvdConfig,
) -> Result<usize, ThreadSafeStdError>
where
    T: SvdScalar,
    LinAlgBackendProvider<T>: BackendQR<T>,
{
    FixedShapeSvd::<ROWS, COLS, T>::new(config.clone()).decompose(a, u, s, v)
}
