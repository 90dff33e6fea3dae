// src/linalg_backends.rs

use crate::scalar::SvdScalar;
use crate::ThreadSafeStdError;
use ndarray::Array2;
use std::marker::PhantomData;

#[cfg(not(any(feature = "backend_faer", feature = "lapack")))]
compile_error!(
    "streaming_svd needs a QR backend: enable `backend_faer` (default) or one of the `backend_openblas*` / `backend_mkl*` features"
);

/// Output of a QR decomposition of a square matrix.
///
/// `q` is unitary and `r` is upper triangular with a real, non-negative
/// diagonal, so that `input = q · r`.
#[derive(Debug, Clone)]
pub struct QrOutput<F: 'static> {
    pub q: Array2<F>,
    pub r: Array2<F>,
}

/// Trait for the QR decomposition used inside the iteration loop.
///
/// Implementers must return a full (square) Q and R for a square input. The
/// QR iteration treats the decomposition as correct and terminating; any
/// sign convention is accepted because results pass through
/// [`normalize_qr_signs`] before they are returned by the provided backends.
pub trait BackendQR<F: SvdScalar> {
    fn qr_decompose(&self, matrix: &Array2<F>) -> Result<QrOutput<F>, ThreadSafeStdError>;
}

/// Rescales the factors so that every diagonal entry of R is real and non-negative.
///
/// Row i of R is multiplied by the conjugate phase of `r[i][i]` and column i of
/// Q by the phase itself, which leaves the product `q · r` unchanged.
pub fn normalize_qr_signs<F: SvdScalar>(q: &mut Array2<F>, r: &mut Array2<F>) {
    let k = r.nrows().min(r.ncols()).min(q.ncols());
    for i in 0..k {
        let phase = r[[i, i]].phase();
        if phase == F::one() {
            continue;
        }
        let phase_conj = phase.conj();
        r.row_mut(i).mapv_inplace(|x| x * phase_conj);
        q.column_mut(i).mapv_inplace(|x| x * phase);
        // Strip rounding residue so the diagonal is exactly real.
        let d = r[[i, i]];
        r[[i, i]] = F::from_real(d.abs());
    }
}

fn check_square<F>(matrix: &Array2<F>) -> Result<usize, ThreadSafeStdError> {
    let (m, n) = matrix.dim();
    if m != n {
        return Err(format!("QR iteration expects a square matrix, got {}x{}", m, n).into());
    }
    Ok(n)
}

// --- FaerLinAlgBackend Implementation (pure Rust) ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{check_square, normalize_qr_signs, BackendQR, QrOutput};
    use crate::ThreadSafeStdError;
    use faer::MatRef;
    use ndarray::Array2;
    use num_complex::Complex;
    use num_traits::Zero;

    /// QR decomposition through faer's blocked Householder QR.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn to_dyn_error_faer(msg: String) -> ThreadSafeStdError {
        msg.into()
    }

    macro_rules! impl_faer_qr {
        ($t:ty) => {
            impl BackendQR<$t> for FaerLinAlgBackend {
                fn qr_decompose(&self, matrix: &Array2<$t>) -> Result<QrOutput<$t>, ThreadSafeStdError> {
                    let n = check_square(matrix)?;
                    if n == 0 {
                        return Ok(QrOutput {
                            q: Array2::zeros((0, 0)),
                            r: Array2::zeros((0, 0)),
                        });
                    }
                    // faer views contiguous row-major memory directly; anything else is copied first.
                    let contiguous = matrix.as_standard_layout();
                    let slice = contiguous.as_slice().ok_or_else(|| {
                        to_dyn_error_faer(format!("Failed to get slice from row-major {}x{} matrix", n, n))
                    })?;
                    let faer_mat_view = MatRef::from_row_major_slice(slice, n, n);

                    let qr_decomp = faer_mat_view.qr();
                    let q_faer = qr_decomp.compute_Q();
                    let r_faer = qr_decomp.R();
                    if q_faer.nrows() != n || q_faer.ncols() != n || r_faer.nrows() != n || r_faer.ncols() != n {
                        return Err(to_dyn_error_faer(format!(
                            "faer QR of a {}x{} matrix returned Q {}x{} and R {}x{}",
                            n,
                            n,
                            q_faer.nrows(),
                            q_faer.ncols(),
                            r_faer.nrows(),
                            r_faer.ncols()
                        )));
                    }

                    let mut q = Array2::from_shape_fn((n, n), |(i, j)| q_faer[(i, j)]);
                    let mut r = Array2::from_shape_fn((n, n), |(i, j)| {
                        if i <= j {
                            r_faer[(i, j)]
                        } else {
                            <$t>::zero()
                        }
                    });
                    normalize_qr_signs(&mut q, &mut r);
                    Ok(QrOutput { q, r })
                }
            }
        };
    }

    impl_faer_qr!(f32);
    impl_faer_qr!(f64);
    impl_faer_qr!(Complex<f32>);
    impl_faer_qr!(Complex<f64>);
}

#[cfg(feature = "backend_faer")]
pub use self::faer_specific_code::FaerLinAlgBackend;

// --- NdarrayLinAlgBackend Implementation (LAPACK through ndarray-linalg) ---
#[cfg(feature = "lapack")]
mod lapack_specific_code {
    use super::{check_square, normalize_qr_signs, BackendQR, QrOutput};
    use crate::ThreadSafeStdError;
    use ndarray::Array2;
    use ndarray_linalg::QR as NdLinalgQR;
    use num_complex::Complex;
    use std::error::Error;

    /// QR decomposition through LAPACK's `?geqrf` / `?orgqr`.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct NdarrayLinAlgBackend;

    // Helper to convert ndarray-linalg's error to Box<dyn Error + Send + Sync>
    fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
        Box::new(e)
    }

    macro_rules! impl_lapack_qr {
        ($t:ty) => {
            impl BackendQR<$t> for NdarrayLinAlgBackend {
                fn qr_decompose(&self, matrix: &Array2<$t>) -> Result<QrOutput<$t>, ThreadSafeStdError> {
                    check_square(matrix)?;
                    let (mut q, mut r) = matrix.qr().map_err(to_dyn_error)?;
                    normalize_qr_signs(&mut q, &mut r);
                    Ok(QrOutput { q, r })
                }
            }
        };
    }

    impl_lapack_qr!(f32);
    impl_lapack_qr!(f64);
    impl_lapack_qr!(Complex<f32>);
    impl_lapack_qr!(Complex<f64>);
}

#[cfg(feature = "lapack")]
pub use self::lapack_specific_code::NdarrayLinAlgBackend;

// --- LinAlgBackendProvider Dispatch ---

/// A provider struct that dispatches to the selected QR backend based on
/// compile-time feature flags: faer when `backend_faer` is enabled, LAPACK
/// through ndarray-linalg otherwise.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

#[cfg(feature = "backend_faer")]
impl<F> BackendQR<F> for LinAlgBackendProvider<F>
where
    F: SvdScalar,
    FaerLinAlgBackend: BackendQR<F>,
{
    fn qr_decompose(&self, matrix: &Array2<F>) -> Result<QrOutput<F>, ThreadSafeStdError> {
        FaerLinAlgBackend.qr_decompose(matrix)
    }
}

#[cfg(all(feature = "lapack", not(feature = "backend_faer")))]
impl<F> BackendQR<F> for LinAlgBackendProvider<F>
where
    F: SvdScalar,
    NdarrayLinAlgBackend: BackendQR<F>,
{
    fn qr_decompose(&self, matrix: &Array2<F>) -> Result<QrOutput<F>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.qr_decompose(matrix)
    }
}
