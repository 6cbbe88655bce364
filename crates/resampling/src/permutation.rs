//! Permutation null distribution.
//!
//! Shuffling `y` against a fixed `x` destroys any pairing while keeping
//! both marginals, so the trial statistics sample the null of "no
//! association". The p-value is the fraction of trials at least as
//! extreme as the observed statistic in absolute value.

use lagscan_core::{Result, SignificanceConverter};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::engine::{ResamplingMethod, ResamplingResult, TrialRun};

/// Relative slack when comparing a trial to the observed statistic, so
/// that exact ties are counted despite rounding.
const RELATIVE_TIE_TOLERANCE: f64 = 1e-12;

pub(crate) fn shuffled_trial<F>(
    x: &[f64],
    y: &[f64],
    statistic_fn: &F,
    rng: &mut ChaCha8Rng,
) -> Option<f64>
where
    F: Fn(&[f64], &[f64]) -> Result<f64>,
{
    let mut permuted = y.to_vec();
    permuted.shuffle(rng);
    statistic_fn(x, &permuted).ok().filter(|v| v.is_finite())
}

/// Number of trial statistics with `|s| >= |observed|`.
#[must_use]
pub fn count_exceedances(statistics: &[f64], observed: f64) -> usize {
    let threshold = observed.abs() * (1.0 - RELATIVE_TIE_TOLERANCE);
    statistics.iter().filter(|s| s.abs() >= threshold).count()
}

/// Empirical p-value and whether it is only an upper bound.
///
/// With no exceedances the estimate is the resolution limit
/// `1 / iterations`.
#[must_use]
pub fn empirical_p_value(exceedances: usize, iterations: usize) -> (f64, bool) {
    if iterations == 0 {
        return (1.0, false);
    }
    if exceedances == 0 {
        return (1.0 / iterations as f64, true);
    }
    (exceedances as f64 / iterations as f64, false)
}

pub(crate) fn summarize(
    observed: f64,
    run: TrialRun,
    converter: &SignificanceConverter,
) -> ResamplingResult {
    let iterations = run.statistics.len();
    let exceedance_count = count_exceedances(&run.statistics, observed);
    let (empirical_p, p_is_upper_bound) = empirical_p_value(exceedance_count, iterations);
    let significance = converter.to_sigma(empirical_p);

    ResamplingResult {
        method: ResamplingMethod::Permutation,
        iterations,
        requested_iterations: run.requested,
        skipped_trials: run.skipped,
        observed_statistic: observed,
        null_distribution_summary: run.summary(),
        empirical_p,
        p_is_upper_bound,
        empirical_sigma: significance.sigma,
        capped: significance.capped,
        exceedance_count,
        confidence_interval: None,
        truncated: run.truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResamplingConfig;
    use crate::engine::ResamplingEngine;
    use lagscan_core::CorrelationMethod;

    #[test]
    fn count_exceedances_uses_absolute_values() {
        let stats = [-0.6, -0.2, 0.1, 0.5, 0.7];
        assert_eq!(count_exceedances(&stats, 0.5), 3);
        assert_eq!(count_exceedances(&stats, -0.5), 3);
    }

    #[test]
    fn count_exceedances_counts_exact_ties() {
        let stats = [0.3, 0.3 + 1e-15, 0.2];
        assert_eq!(count_exceedances(&stats, 0.3), 2);
    }

    #[test]
    fn zero_exceedances_report_upper_bound() {
        let (p, upper) = empirical_p_value(0, 10_000);
        assert!((p - 1e-4).abs() < 1e-18);
        assert!(upper);
    }

    #[test]
    fn nonzero_exceedances_are_exact_fraction() {
        let (p, upper) = empirical_p_value(25, 1_000);
        assert!((p - 0.025).abs() < f64::EPSILON);
        assert!(!upper);
    }

    #[test]
    fn strong_correlation_hits_resolution_limit() {
        let x: Vec<f64> = (0..50).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let result = ResamplingEngine::new(ResamplingConfig::new(1_000))
            .permutation_test_method(&x, &y, CorrelationMethod::Pearson, 42)
            .unwrap();

        assert_eq!(result.method, ResamplingMethod::Permutation);
        assert_eq!(result.exceedance_count, 0);
        assert!(result.p_is_upper_bound);
        assert!((result.empirical_p - 1e-3).abs() < 1e-15);
        // 1e-3 two-sided is about 3.29 sigma
        assert!((result.empirical_sigma - 3.2905).abs() < 1e-3);
        assert!(!result.capped);
        assert!(result.confidence_interval.is_none());
    }

    #[test]
    fn null_distribution_is_centred_on_zero() {
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| (v * 0.37).sin()).collect();
        let result = ResamplingEngine::new(ResamplingConfig::new(2_000))
            .permutation_test_method(&x, &y, CorrelationMethod::Spearman, 5)
            .unwrap();

        assert!(result.null_distribution_summary.mean.abs() < 0.02);
        // Spearman null std is about 1 / sqrt(n - 1)
        assert!((result.null_distribution_summary.std - 0.1).abs() < 0.02);
    }
}
