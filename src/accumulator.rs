// src/accumulator.rs

use crate::matmul::{identity, matmul};
use crate::scalar::SvdScalar;
use crate::ThreadSafeStdError;
use ndarray::{Array2, ArrayView2};

/// Running product of the Q factors produced by the QR iteration.
///
/// Starts at the identity and is right-multiplied by every incoming block, so
/// after k steps it holds `Q_0 · Q_1 · … · Q_{k-1}`. The product is emitted
/// only when the caller opens the gate, which happens on the iteration the
/// convergence checker marks as converged.
#[derive(Debug, Clone)]
pub struct Accumulator<T: SvdScalar> {
    running: Array2<T>,
    steps: usize,
}

impl<T: SvdScalar> Accumulator<T> {
    /// Creates an accumulator for `n` x `n` blocks, initialised to the identity.
    pub fn new(n: usize) -> Self {
        Self {
            running: identity(n),
            steps: 0,
        }
    }

    /// Restores the identity so a new run starts from a clean product.
    pub fn reset(&mut self) {
        let n = self.running.nrows();
        self.running = identity(n);
        self.steps = 0;
    }

    /// Current running product.
    pub fn running(&self) -> &Array2<T> {
        &self.running
    }

    /// Number of blocks multiplied in since the last reset.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Multiplies `block` into the running product and returns a snapshot of it when `gate` is open.
    ///
    /// # Errors
    /// Returns an error if `block` is not the accumulator's square size.
    pub fn step(&mut self, block: &ArrayView2<'_, T>, gate: bool) -> Result<Option<Array2<T>>, ThreadSafeStdError> {
        let n = self.running.nrows();
        if block.dim() != (n, n) {
            return Err(format!(
                "Accumulator expects {}x{} blocks, got {}x{}",
                n,
                n,
                block.nrows(),
                block.ncols()
            )
            .into());
        }
        self.running = matmul(&self.running.view(), block)?;
        self.steps += 1;
        Ok(gate.then(|| self.running.clone()))
    }
}
