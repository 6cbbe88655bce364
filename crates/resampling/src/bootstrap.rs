//! Bootstrap sampling distribution of a paired statistic.
//!
//! Pairs are resampled with replacement, which keeps the association and
//! estimates the spread of the statistic around its observed value. The
//! significance is the observed statistic in units of that spread.

use lagscan_core::{sigma_to_p, Result, SignificanceConverter};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::engine::{ResamplingMethod, ResamplingResult, TrialRun};
use crate::summary::percentile_ci;

/// Generates a bootstrap resample of indices.
///
/// Returns a vector of indices sampled with replacement from [0, n).
fn resample_indices(n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

pub(crate) fn resampled_trial<F>(
    x: &[f64],
    y: &[f64],
    statistic_fn: &F,
    rng: &mut ChaCha8Rng,
) -> Option<f64>
where
    F: Fn(&[f64], &[f64]) -> Result<f64>,
{
    let indices = resample_indices(x.len(), rng);
    let xs: Vec<f64> = indices.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
    statistic_fn(&xs, &ys).ok().filter(|v| v.is_finite())
}

/// Replicates on the opposite side of zero from `observed`.
///
/// A zero observed statistic has no side, so every replicate counts.
#[must_use]
pub fn count_sign_reversals(statistics: &[f64], observed: f64) -> usize {
    if observed > 0.0 {
        statistics.iter().filter(|&&s| s <= 0.0).count()
    } else if observed < 0.0 {
        statistics.iter().filter(|&&s| s >= 0.0).count()
    } else {
        statistics.len()
    }
}

pub(crate) fn summarize(
    observed: f64,
    run: TrialRun,
    confidence_level: f64,
    converter: &SignificanceConverter,
) -> ResamplingResult {
    let summary = run.summary();
    let exceedance_count = count_sign_reversals(&run.statistics, observed);

    let mut distribution = run.statistics;
    distribution.sort_by(f64::total_cmp);
    let confidence_interval = percentile_ci(&distribution, confidence_level);

    // std == 0 gives an infinite z, which the converter caps
    let significance = converter.clamp_sigma(observed.abs() / summary.std);
    let empirical_p = sigma_to_p(significance.sigma);

    ResamplingResult {
        method: ResamplingMethod::Bootstrap,
        iterations: distribution.len(),
        requested_iterations: run.requested,
        skipped_trials: run.skipped,
        observed_statistic: observed,
        null_distribution_summary: summary,
        empirical_p,
        p_is_upper_bound: false,
        empirical_sigma: significance.sigma,
        capped: significance.capped,
        exceedance_count,
        confidence_interval: Some(confidence_interval),
        truncated: run.truncated,
    }
}
