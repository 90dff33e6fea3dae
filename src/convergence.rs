// src/convergence.rs

use crate::scalar::{real_to_f64, SvdScalar};
use crate::ThreadSafeStdError;
use log::trace;
use ndarray::{Array1, ArrayView2};
use num_traits::{Float, Zero};

/// Where the checker routes the R matrix it was just given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Back into the loop: R feeds the next `R · Q` product.
    Feedback,
    /// Out of the loop: R is the final iterate used to build S.
    Final,
}

/// Result of one observation: the convergence flag paired with the matrix
/// instance it qualifies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceRecord {
    /// Iteration index the observed R belongs to.
    pub iteration: usize,
    /// Converged state after this observation.
    pub converged: bool,
    /// `true` when `converged` was forced by the iteration budget rather than by the drift test.
    pub forced: bool,
    /// Largest relative diagonal drift that took part in the comparison (None when
    /// no entry was compared, e.g. on the first two iterations).
    pub max_relative_drift: Option<f64>,
    /// Where the observed R was routed. Chosen from the state *before* this observation.
    pub destination: Destination,
}

/// Tracks the diagonal of successive R factors and decides when the QR iteration has settled.
///
/// Each diagonal entry whose current and previous moduli both exceed `epsilon`
/// contributes a relative drift `|cur - prev| / |cur|`; the iteration is
/// converged when none of them exceeds `max_relative_error`. Entries at or
/// below `epsilon` are treated as already zero and skipped. Iterations 0 and 1
/// never converge, and convergence is forced once
/// `iteration >= max_iterations - 2` so the loop always terminates.
#[derive(Debug, Clone)]
pub struct DiagonalConvergence<T: SvdScalar> {
    max_iterations: usize,
    epsilon: T::Real,
    max_relative_error: T::Real,
    previous_diagonal: Array1<T::Real>,
    converged: bool,
}

impl<T: SvdScalar> DiagonalConvergence<T> {
    /// Creates a checker for `diagonal_size` x `diagonal_size` matrices.
    ///
    /// # Errors
    /// Returns an error if `max_iterations` is zero or a tolerance is negative or non-finite.
    pub fn new(
        diagonal_size: usize,
        max_iterations: usize,
        epsilon: T::Real,
        max_relative_error: T::Real,
    ) -> Result<Self, ThreadSafeStdError> {
        if max_iterations == 0 {
            return Err("Convergence checker needs an iteration budget of at least 1.".into());
        }
        if !epsilon.is_finite() || epsilon < T::Real::zero() {
            return Err(format!("Convergence epsilon must be finite and non-negative, got {:?}", epsilon).into());
        }
        if !max_relative_error.is_finite() || max_relative_error < T::Real::zero() {
            return Err(format!(
                "Maximum relative error must be finite and non-negative, got {:?}",
                max_relative_error
            )
            .into());
        }
        Ok(Self {
            max_iterations,
            epsilon,
            max_relative_error,
            previous_diagonal: Array1::zeros(diagonal_size),
            converged: false,
        })
    }

    /// Whether the most recent observation left the checker converged.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Diagonal moduli recorded by the last comparison.
    pub fn previous_diagonal(&self) -> &Array1<T::Real> {
        &self.previous_diagonal
    }

    /// Clears the history so the checker can serve a new decomposition run.
    pub fn reset(&mut self) {
        self.previous_diagonal.fill(T::Real::zero());
        self.converged = false;
    }

    /// Observes the R factor of `iteration` and returns the paired convergence record.
    ///
    /// # Errors
    /// Returns an error if `r` is not the square size the checker was built for.
    pub fn observe(
        &mut self,
        r: &ArrayView2<'_, T>,
        iteration: usize,
    ) -> Result<ConvergenceRecord, ThreadSafeStdError> {
        let n = self.previous_diagonal.len();
        if r.dim() != (n, n) {
            return Err(format!(
                "Convergence checker expects a {}x{} matrix, got {}x{}",
                n,
                n,
                r.nrows(),
                r.ncols()
            )
            .into());
        }

        // Once converged every later matrix goes to the final destination untouched.
        if self.converged {
            return Ok(ConvergenceRecord {
                iteration,
                converged: true,
                forced: false,
                max_relative_drift: None,
                destination: Destination::Final,
            });
        }

        // at least 2 iterations are needed to have a history to compare against
        let mut converge_so_far = iteration > 1;
        let mut max_drift: Option<T::Real> = None;

        for i in 0..n {
            let current = r[[i, i]].abs();
            let previous = self.previous_diagonal[i];
            if current > self.epsilon && previous > self.epsilon {
                let drift = (current - previous).abs() / current;
                max_drift = Some(match max_drift {
                    Some(m) if m >= drift => m,
                    _ => drift,
                });
                if !(drift <= self.max_relative_error) {
                    converge_so_far = false;
                }
            }
            self.previous_diagonal[i] = current;
        }

        let forced = iteration + 2 >= self.max_iterations;
        self.converged = forced || converge_so_far;

        let max_relative_drift = max_drift.map(real_to_f64);
        trace!(
            "Iteration {}: max relative diagonal drift {:?}, converged={} (forced={})",
            iteration,
            max_relative_drift,
            self.converged,
            forced && !converge_so_far
        );

        Ok(ConvergenceRecord {
            iteration,
            converged: self.converged,
            forced: forced && !converge_so_far,
            max_relative_drift,
            destination: Destination::Feedback,
        })
    }
}
