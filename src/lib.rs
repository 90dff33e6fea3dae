// Singular value decomposition by QR iteration on the Gram matrix

#![doc = include_str!("../README.md")]

use std::error::Error;

pub mod accumulator;
pub mod convergence;
pub mod diagnostics;
pub mod fixed;
pub mod linalg_backends;
pub mod matmul;
pub mod orthogonalizer;
pub mod post_process;
pub mod scalar;
pub mod svd;

#[cfg(test)]
mod svd_tests;

pub use crate::diagnostics::{assess, SvdQualityReport};
pub use crate::fixed::{singular_value_decomposition, FixedShapeSvd};
pub use crate::linalg_backends::{BackendQR, LinAlgBackendProvider, QrOutput};
#[cfg(feature = "backend_faer")]
pub use crate::linalg_backends::FaerLinAlgBackend;
#[cfg(feature = "lapack")]
pub use crate::linalg_backends::NdarrayLinAlgBackend;
pub use crate::matmul::GramSide;
pub use crate::scalar::SvdScalar;
pub use crate::svd::{StreamingSvd, SvdConfig, SvdOutput, SvdStage};

/// Error type shared across the crate; every fallible operation returns it.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Smallest number of rows and of columns the decomposition accepts.
pub const MIN_MATRIX_DIM: usize = 2;

/// Decomposes `a` with the default configuration and backend.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// let a = array![[2.0f64, 0.0], [0.0, 1.0], [0.0, 0.0]];
/// let out = streaming_svd::svd(&a).unwrap();
/// assert_eq!(out.u.dim(), (3, 3));
/// assert!((out.sorted_singular_values()[0] - 2.0).abs() < 1e-9);
/// ```
pub fn svd<T>(a: &ndarray::Array2<T>) -> Result<SvdOutput<T>, ThreadSafeStdError>
where
    T: SvdScalar,
    LinAlgBackendProvider<T>: BackendQR<T>,
{
    StreamingSvd::new(SvdConfig::default()).decompose(a)
}
