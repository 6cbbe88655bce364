//! Conversion of p-values into bounded "sigma" significance.
//!
//! This is the single policy for turning a two-sided p-value into a
//! standard-normal significance. Every stage of the engine (analytic
//! correlation p-values, permutation and bootstrap estimates, scan
//! look-elsewhere penalties, multi-source combination) goes through
//! [`SignificanceConverter`] so the underflow handling is identical
//! everywhere.
//!
//! # Policy
//!
//! - `p >= 1` maps to `0.0`.
//! - `0 < p < 1` maps to `sqrt(2) * erfc_inv(p)`, which equals
//!   `Phi^-1(1 - p/2)` without the cancellation in `1 - p/2`.
//! - `p == 0`, or a transform that is non-finite or above the ceiling,
//!   maps to the ceiling with `capped = true`.
//! - `NaN` maps to `0.0` (no evidence), never capped.

use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

use crate::error::{EngineError, Result};

/// Default sigma ceiling.
pub const DEFAULT_SIGMA_CEILING: f64 = 15.0;

/// A bounded significance value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    /// Significance in standard-normal units, finite and in `[0, ceiling]`.
    pub sigma: f64,
    /// True when the value was clamped to the ceiling.
    pub capped: bool,
}

impl Significance {
    /// Zero significance.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            sigma: 0.0,
            capped: false,
        }
    }
}

/// Converts p-values and z-scores to capped significance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceConverter {
    ceiling: f64,
}

impl Default for SignificanceConverter {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_SIGMA_CEILING,
        }
    }
}

impl SignificanceConverter {
    /// Creates a converter with a custom ceiling.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the ceiling is not a positive finite number.
    pub fn with_ceiling(ceiling: f64) -> Result<Self> {
        if !ceiling.is_finite() || ceiling <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "sigma ceiling must be positive and finite, got {ceiling}"
            )));
        }
        Ok(Self { ceiling })
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Converts a two-sided p-value to significance.
    #[must_use]
    pub fn to_sigma(&self, p_value: f64) -> Significance {
        if p_value.is_nan() || p_value >= 1.0 {
            return Significance::zero();
        }
        if p_value <= 0.0 {
            return self.capped();
        }

        let sigma = SQRT_2 * erfc_inv(p_value);
        if !sigma.is_finite() || sigma > self.ceiling {
            return self.capped();
        }

        Significance {
            sigma: sigma.max(0.0),
            capped: false,
        }
    }

    /// Applies the ceiling policy to a z-score computed elsewhere
    /// (e.g. `|observed| / bootstrap_std`).
    #[must_use]
    pub fn clamp_sigma(&self, z: f64) -> Significance {
        if z.is_nan() {
            return Significance::zero();
        }
        let z = z.abs();
        if !z.is_finite() || z > self.ceiling {
            return self.capped();
        }
        Significance {
            sigma: z,
            capped: false,
        }
    }

    fn capped(&self) -> Significance {
        Significance {
            sigma: self.ceiling,
            capped: true,
        }
    }
}

/// Converts a two-sided p-value to significance with the given ceiling.
///
/// An invalid ceiling (non-finite or non-positive) falls back to
/// [`DEFAULT_SIGMA_CEILING`], so this function never fails.
///
/// # Examples
/// ```
/// use lagscan_core::significance::to_sigma;
///
/// let s = to_sigma(0.05, 15.0);
/// assert!((s.sigma - 1.96).abs() < 0.01);
///
/// let s = to_sigma(0.0, 15.0);
/// assert_eq!(s.sigma, 15.0);
/// assert!(s.capped);
/// ```
#[must_use]
pub fn to_sigma(p_value: f64, ceiling: f64) -> Significance {
    SignificanceConverter::with_ceiling(ceiling)
        .unwrap_or_default()
        .to_sigma(p_value)
}

/// Two-sided p-value for a significance: `erfc(sigma / sqrt(2))`.
#[must_use]
pub fn sigma_to_p(sigma: f64) -> f64 {
    if sigma.is_nan() {
        return 1.0;
    }
    erfc(sigma.abs() / SQRT_2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ============================================
    // to_sigma Tests
    // ============================================

    #[test]
    fn p_005_is_about_196_sigma() {
        let s = to_sigma(0.05, DEFAULT_SIGMA_CEILING);
        assert!((s.sigma - 1.959_964).abs() < 1e-4, "sigma was {}", s.sigma);
        assert!(!s.capped);
    }

    #[test]
    fn p_one_is_zero_sigma() {
        let s = to_sigma(1.0, DEFAULT_SIGMA_CEILING);
        assert_eq!(s.sigma, 0.0);
        assert!(!s.capped);
    }

    #[test]
    fn p_zero_is_capped_at_ceiling() {
        let s = to_sigma(0.0, 15.0);
        assert_eq!(s.sigma, 15.0);
        assert!(s.capped);
    }

    #[test]
    fn five_sigma_round_trips() {
        let p = sigma_to_p(5.0);
        assert!((p - 5.733e-7).abs() < 1e-9, "p was {p}");
        let s = to_sigma(p, DEFAULT_SIGMA_CEILING);
        assert!((s.sigma - 5.0).abs() < 1e-6, "sigma was {}", s.sigma);
    }

    #[test]
    fn tiny_p_beyond_ceiling_is_capped() {
        // ~20 sigma
        let s = to_sigma(1e-88, 15.0);
        assert_eq!(s.sigma, 15.0);
        assert!(s.capped);
    }

    #[test]
    fn tiny_p_below_ceiling_is_exact() {
        // 10 sigma two-sided is ~1.5e-23
        let s = to_sigma(sigma_to_p(10.0), 15.0);
        assert!((s.sigma - 10.0).abs() < 1e-6, "sigma was {}", s.sigma);
        assert!(!s.capped);
    }

    #[test]
    fn subnormal_p_is_capped_not_infinite() {
        let s = to_sigma(f64::MIN_POSITIVE / 1e10, 15.0);
        assert!(s.sigma.is_finite());
        assert!(s.capped);
    }

    #[test]
    fn nan_p_is_zero_not_capped() {
        let s = to_sigma(f64::NAN, 15.0);
        assert_eq!(s.sigma, 0.0);
        assert!(!s.capped);
    }

    #[test]
    fn negative_p_is_treated_as_underflow() {
        let s = to_sigma(-1e-12, 15.0);
        assert!(s.capped);
    }

    #[test]
    fn invalid_ceiling_falls_back_to_default() {
        let s = to_sigma(0.0, f64::INFINITY);
        assert_eq!(s.sigma, DEFAULT_SIGMA_CEILING);

        let s = to_sigma(0.0, -3.0);
        assert_eq!(s.sigma, DEFAULT_SIGMA_CEILING);
    }

    #[test]
    fn with_ceiling_rejects_non_positive() {
        assert!(SignificanceConverter::with_ceiling(0.0).is_err());
        assert!(SignificanceConverter::with_ceiling(f64::NAN).is_err());
        assert!(SignificanceConverter::with_ceiling(8.0).is_ok());
    }

    #[test]
    fn custom_ceiling_caps_lower() {
        let converter = SignificanceConverter::with_ceiling(3.0).unwrap();
        let s = converter.to_sigma(1e-6);
        assert_eq!(s.sigma, 3.0);
        assert!(s.capped);
    }

    // ============================================
    // clamp_sigma Tests
    // ============================================

    #[test]
    fn clamp_sigma_takes_absolute_value() {
        let s = SignificanceConverter::default().clamp_sigma(-2.5);
        assert!((s.sigma - 2.5).abs() < f64::EPSILON);
        assert!(!s.capped);
    }

    #[test]
    fn clamp_sigma_caps_infinity() {
        let s = SignificanceConverter::default().clamp_sigma(f64::INFINITY);
        assert_eq!(s.sigma, DEFAULT_SIGMA_CEILING);
        assert!(s.capped);
    }

    #[test]
    fn clamp_sigma_nan_is_zero() {
        let s = SignificanceConverter::default().clamp_sigma(f64::NAN);
        assert_eq!(s, Significance::zero());
    }

    #[test]
    fn sigma_to_p_of_zero_is_one() {
        assert!((sigma_to_p(0.0) - 1.0).abs() < f64::EPSILON);
    }

    // ============================================
    // Properties
    // ============================================

    proptest! {
        #[test]
        fn to_sigma_is_finite_and_bounded(p in prop::num::f64::ANY, ceiling in 0.5f64..50.0) {
            let s = to_sigma(p, ceiling);
            prop_assert!(s.sigma.is_finite());
            prop_assert!(s.sigma >= 0.0);
            prop_assert!(s.sigma <= ceiling);
        }

        #[test]
        fn to_sigma_is_non_increasing(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let s_lo = to_sigma(lo, DEFAULT_SIGMA_CEILING).sigma;
            let s_hi = to_sigma(hi, DEFAULT_SIGMA_CEILING).sigma;
            prop_assert!(s_lo + 1e-9 >= s_hi, "sigma({lo})={s_lo} < sigma({hi})={s_hi}");
        }

        #[test]
        fn to_sigma_is_monotone_in_log_space(e1 in -300.0f64..0.0, e2 in -300.0f64..0.0) {
            let (lo, hi) = if e1 <= e2 { (e1, e2) } else { (e2, e1) };
            let s_lo = to_sigma(10f64.powf(lo), DEFAULT_SIGMA_CEILING).sigma;
            let s_hi = to_sigma(10f64.powf(hi), DEFAULT_SIGMA_CEILING).sigma;
            prop_assert!(s_lo + 1e-9 >= s_hi);
        }
    }
}
