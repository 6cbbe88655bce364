//! Summaries of a resampled distribution.

use serde::{Deserialize, Serialize};

/// Mean and population standard deviation of the trial statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NullDistributionSummary {
    /// Mean of the trial statistics.
    pub mean: f64,
    /// Population standard deviation of the trial statistics.
    pub std: f64,
}

impl NullDistributionSummary {
    /// Creates a summary from a slice of values.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::empty();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            mean,
            std: variance.sqrt(),
        }
    }

    /// Returns an empty summary.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            mean: 0.0,
            std: 0.0,
        }
    }
}

/// Extracts percentile confidence interval from a sorted distribution.
///
/// # Arguments
/// * `distribution` - Sorted vector of bootstrap statistics
/// * `confidence_level` - Desired confidence level (e.g., 0.95)
///
/// # Returns
/// Tuple of (lower_bound, upper_bound)
#[must_use]
pub fn percentile_ci(distribution: &[f64], confidence_level: f64) -> (f64, f64) {
    if distribution.is_empty() {
        return (0.0, 0.0);
    }
    if distribution.len() == 1 {
        return (distribution[0], distribution[0]);
    }

    let alpha = 1.0 - confidence_level;
    let n = distribution.len();

    let lower_idx = ((alpha / 2.0) * n as f64).floor() as usize;
    let upper_idx = ((1.0 - alpha / 2.0) * n as f64).ceil() as usize;

    // Clamp to valid range
    let lower_idx = lower_idx.min(n - 1);
    let upper_idx = upper_idx.min(n - 1).max(lower_idx);

    (distribution[lower_idx], distribution[upper_idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn summary_uses_population_std() {
        let summary = NullDistributionSummary::from_values(&[1.0, 2.0, 3.0, 4.0]);
        assert!((summary.mean - 2.5).abs() < f64::EPSILON);
        assert!((summary.std - 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn summary_of_empty_is_zero() {
        assert_eq!(
            NullDistributionSummary::from_values(&[]),
            NullDistributionSummary::empty()
        );
    }

    #[test]
    fn percentile_ci_brackets_the_middle() {
        let distribution: Vec<f64> = (0..100).map(f64::from).collect();
        let (lower, upper) = percentile_ci(&distribution, 0.5);
        assert!((lower - 25.0).abs() < f64::EPSILON, "lower was {lower}");
        assert!((upper - 75.0).abs() < f64::EPSILON, "upper was {upper}");
    }

    #[test]
    fn percentile_ci_single_value() {
        assert_eq!(percentile_ci(&[0.3], 0.95), (0.3, 0.3));
    }

    #[test]
    fn percentile_ci_clamps_upper_index() {
        let (lower, upper) = percentile_ci(&[1.0, 2.0], 0.99);
        assert!((lower - 1.0).abs() < f64::EPSILON);
        assert!((upper - 2.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn percentile_ci_is_ordered_and_inside_range(
            mut values in prop::collection::vec(-1.0f64..1.0, 1..300),
            confidence in 0.5f64..0.999
        ) {
            values.sort_by(f64::total_cmp);
            let (lower, upper) = percentile_ci(&values, confidence);
            prop_assert!(lower <= upper);
            prop_assert!(lower >= values[0]);
            prop_assert!(upper <= values[values.len() - 1]);
        }
    }
}
