// src/scalar.rs

use ndarray::ScalarOperand;
use ndarray_linalg::Scalar;
use num_traits::{Float, One, ToPrimitive, Zero};
use std::any::TypeId;

/// Element type accepted by every stage of the decomposition.
///
/// Every `ndarray_linalg::Scalar` that ndarray can broadcast qualifies, which
/// covers `f32`, `f64`, `c32` and `c64`. The crate uses the `Scalar`
/// vocabulary directly: `conj`, `abs` (modulus), `square` (squared modulus),
/// `from_real`, `mul_real` and `real` for constants. `Scalar::Real` carries
/// magnitudes, tolerances and singular values.
pub trait SvdScalar: Scalar + ScalarOperand + Send + Sync {
    /// `true` for complex element types. Inner products then conjugate their
    /// left operand and transposes are conjugate transposes.
    fn is_complex() -> bool {
        TypeId::of::<Self>() == TypeId::of::<Self::Complex>()
    }

    /// Unit-modulus phase of the value (`x / |x|`), or one for zero.
    fn phase(self) -> Self {
        let m = self.abs();
        if m > <Self::Real as Zero>::zero() {
            self.mul_real(Float::recip(m))
        } else {
            <Self as One>::one()
        }
    }
}

impl<T: Scalar + ScalarOperand + Send + Sync> SvdScalar for T {}

/// Converts a real scalar to `f64` for reporting; non-representable values become NaN.
pub(crate) fn real_to_f64<R: ToPrimitive>(value: R) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray_linalg::{c32, c64};

    #[test]
    fn complex_flag_follows_element_type() {
        assert!(c64::is_complex());
        assert!(c32::is_complex());
        assert!(!f32::is_complex());
        assert!(!f64::is_complex());
    }

    #[test]
    fn phase_has_unit_modulus_and_defaults_to_one() {
        let z = c32::new(-2.0, 2.0);
        assert_abs_diff_eq!(z.phase().norm(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(SvdScalar::phase(-7.5f64), -1.0, epsilon = 1e-12);
        assert_eq!(SvdScalar::phase(0.0f64), 1.0);
        assert_eq!(c64::new(0.0, 0.0).phase(), c64::new(1.0, 0.0));
    }

    #[test]
    fn real_to_f64_widens() {
        assert_abs_diff_eq!(real_to_f64(0.25f32), 0.25, epsilon = 0.0);
        assert_abs_diff_eq!(real_to_f64(<f32 as Scalar>::real(2e-6)), 2e-6, epsilon = 1e-12);
    }
}
