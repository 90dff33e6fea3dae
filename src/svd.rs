// src/svd.rs

use crate::accumulator::Accumulator;
use crate::convergence::{DiagonalConvergence, Destination};
use crate::linalg_backends::{BackendQR, LinAlgBackendProvider, QrOutput};
use crate::matmul::{gram_matrix, matmul, GramSide};
use crate::post_process::{PostProcessor, SvdFactors};
use crate::scalar::SvdScalar;
use crate::{ThreadSafeStdError, MIN_MATRIX_DIM};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView2};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Tuning knobs for the QR iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvdConfig {
    /// Hard cap on the number of `R · Q` products. Reaching it is not an error;
    /// the run ends with `forced_termination` set.
    pub max_iterations: usize,
    /// Diagonal magnitudes (and singular values) at or below this are treated as zero.
    pub epsilon: f64,
    /// Largest relative change of a diagonal entry between two iterations that still counts as converged.
    pub max_relative_error: f64,
    /// Which Gram matrix to iterate on.
    pub gram_side: GramSide,
}

impl Default for SvdConfig {
    fn default() -> Self {
        SvdConfig {
            max_iterations: 1000,
            epsilon: 2e-6,
            max_relative_error: 1e-8,
            gram_side: GramSide::Auto,
        }
    }
}

impl SvdConfig {
    /// Checks the knobs for values the iteration cannot work with.
    pub fn validate(&self) -> Result<(), ThreadSafeStdError> {
        if self.max_iterations == 0 {
            return Err("SvdConfig.max_iterations must be at least 1.".into());
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(format!("SvdConfig.epsilon must be finite and non-negative, got {}", self.epsilon).into());
        }
        if !self.max_relative_error.is_finite() || self.max_relative_error < 0.0 {
            return Err(format!(
                "SvdConfig.max_relative_error must be finite and non-negative, got {}",
                self.max_relative_error
            )
            .into());
        }
        Ok(())
    }
}

/// Lifecycle of one decomposition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvdStage {
    Init,
    TransposeMultiply,
    QrIterate,
    PostProcess,
    Done,
}

impl fmt::Display for SvdStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SvdStage::Init => "INIT",
            SvdStage::TransposeMultiply => "TRANSPOSE-MULTIPLY",
            SvdStage::QrIterate => "QR-ITERATE",
            SvdStage::PostProcess => "POST-PROCESS",
            SvdStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Result of a decomposition: `a ≈ u · s · vᴴ`.
#[derive(Debug, Clone)]
pub struct SvdOutput<T: SvdScalar> {
    /// `rows x rows`.
    pub u: Array2<T>,
    /// `rows x cols`, singular values on the diagonal.
    pub s: Array2<T>,
    /// `cols x cols`.
    pub v: Array2<T>,
    /// Diagonal of `s` in iteration order (usually, but not necessarily, descending).
    pub singular_values: Array1<T::Real>,
    /// Number of `R · Q` products performed.
    pub iterations: usize,
    /// Set when the iteration cap, not the drift test, ended the loop.
    pub forced_termination: bool,
    /// Resolved side the iteration ran on.
    pub gram_side: GramSide,
}

impl<T: SvdScalar> SvdOutput<T> {
    /// Singular values sorted in descending order.
    pub fn sorted_singular_values(&self) -> Vec<T::Real> {
        let mut values = self.singular_values.to_vec();
        values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        values
    }

    /// Recomputes `u · s · vᴴ`.
    pub fn reconstruct(&self) -> Result<Array2<T>, ThreadSafeStdError> {
        let us = matmul(&self.u.view(), &self.s.view())?;
        let v_h = crate::matmul::adjoint(&self.v.view());
        matmul(&us.view(), &v_h.view())
    }
}

/// Singular value decomposition by unshifted QR iteration on the Gram matrix.
///
/// Each iteration factors the current iterate as `Q · R`, lets the diagonal
/// convergence checker look at R, multiplies Q into the running product and
/// forms the next iterate `R · Q`. Once the diagonal has settled, the running
/// product is one of the singular vector factors, the square roots of R's
/// diagonal are the singular values, and the other factor is derived from A.
///
/// The QR decomposition is pluggable through [`BackendQR`]; by default the
/// crate's feature flags pick between faer (pure Rust, the default) and LAPACK.
pub struct StreamingSvd<T: SvdScalar, B = LinAlgBackendProvider<T>> {
    config: SvdConfig,
    backend: B,
    _element: PhantomData<T>,
}

impl<T: SvdScalar> StreamingSvd<T, LinAlgBackendProvider<T>>
where
    LinAlgBackendProvider<T>: BackendQR<T>,
{
    /// Creates a decomposer using the default backend for the enabled features.
    pub fn new(config: SvdConfig) -> Self {
        Self::with_backend(config, LinAlgBackendProvider::new())
    }
}

impl<T: SvdScalar, B: BackendQR<T>> StreamingSvd<T, B> {
    /// Creates a decomposer with an explicit QR backend.
    pub fn with_backend(config: SvdConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            _element: PhantomData,
        }
    }

    pub fn config(&self) -> &SvdConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Decomposes `a` into `u · s · vᴴ`.
    ///
    /// # Errors
    /// Returns an error for an invalid configuration, a dimension below
    /// [`MIN_MATRIX_DIM`], non-finite entries, or a failing QR backend.
    /// Running into the iteration cap is *not* an error.
    pub fn decompose(&self, a: &Array2<T>) -> Result<SvdOutput<T>, ThreadSafeStdError> {
        self.decompose_view(&a.view())
    }

    /// Same as [`decompose`](Self::decompose) for a borrowed view.
    pub fn decompose_view(&self, a: &ArrayView2<'_, T>) -> Result<SvdOutput<T>, ThreadSafeStdError> {
        let start_time = std::time::Instant::now();
        let mut stage = SvdStage::Init;
        debug!("SVD stage {}", stage);

        self.config.validate()?;
        let (rows, cols) = a.dim();
        if rows < MIN_MATRIX_DIM || cols < MIN_MATRIX_DIM {
            return Err(format!(
                "SVD input must be at least {}x{}, got {}x{}",
                MIN_MATRIX_DIM, MIN_MATRIX_DIM, rows, cols
            )
            .into());
        }
        if let Some(((i, j), _)) = a.indexed_iter().find(|(_, x)| !x.abs().is_finite()) {
            return Err(format!("SVD input has a non-finite entry at ({}, {})", i, j).into());
        }

        let side = self.config.gram_side.resolve(rows, cols);
        let n = side.gram_dim(rows, cols);
        info!(
            "Starting SVD of {}x{} matrix by QR iteration on {:?} Gram matrix ({}x{}), max {} iterations",
            rows, cols, side, n, n, self.config.max_iterations
        );

        stage = transition(stage, SvdStage::TransposeMultiply);
        let gram = gram_matrix(a, side)?;

        stage = transition(stage, SvdStage::QrIterate);
        let epsilon = T::real(self.config.epsilon);
        let max_relative_error = T::real(self.config.max_relative_error);
        // One extra slot so the checker forces convergence on the last permitted product.
        let mut checker =
            DiagonalConvergence::<T>::new(n, self.config.max_iterations + 1, epsilon, max_relative_error)?;
        let mut accumulator = Accumulator::<T>::new(n);

        let mut iterate = gram;
        let mut captured: Option<Array2<T>> = None;
        let mut iterations = 0usize;
        let mut forced_termination = false;

        let final_r = loop {
            let QrOutput { q, r } = self.backend.qr_decompose(&iterate)?;
            if q.dim() != (n, n) || r.dim() != (n, n) {
                return Err(format!(
                    "QR backend returned Q {:?} and R {:?} for a {}x{} iterate",
                    q.dim(),
                    r.dim(),
                    n,
                    n
                )
                .into());
            }

            let record = checker.observe(&r.view(), iterations)?;
            if record.destination == Destination::Final {
                break r;
            }
            if record.converged {
                forced_termination = record.forced;
                debug!(
                    "Diagonal converged at iteration {} (max drift {:?})",
                    record.iteration, record.max_relative_drift
                );
            }
            if let Some(factor) = accumulator.step(&q.view(), record.converged)? {
                captured = Some(factor);
            }
            iterate = matmul(&r.view(), &q.view())?;
            iterations += 1;
        };

        if forced_termination {
            warn!(
                "QR iteration hit the cap of {} iterations before the diagonal settled to {:e}; results may be inaccurate",
                self.config.max_iterations, self.config.max_relative_error
            );
        }
        let accumulated = captured.ok_or("QR iteration finished without capturing the accumulated factor")?;

        stage = transition(stage, SvdStage::PostProcess);
        let SvdFactors {
            u,
            s,
            v,
            singular_values,
        } = PostProcessor::<T>::new(epsilon).run(a, &final_r.view(), accumulated, side)?;

        transition(stage, SvdStage::Done);
        info!(
            "SVD of {}x{} matrix finished in {:?} after {} iterations{}",
            rows,
            cols,
            start_time.elapsed(),
            iterations,
            if forced_termination { " (forced)" } else { "" }
        );

        Ok(SvdOutput {
            u,
            s,
            v,
            singular_values,
            iterations,
            forced_termination,
            gram_side: side,
        })
    }
}

fn transition(from: SvdStage, to: SvdStage) -> SvdStage {
    debug!("SVD stage {} -> {}", from, to);
    to
}
