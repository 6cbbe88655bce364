//! Null-hypothesis behaviour of the resampling engine on independent data.
//!
//! Verifies:
//! - A permutation test on 10,000 independent uniform pairs stays below 3 sigma
//! - Bootstrap significance stays below 3 sigma in at least 95% of
//!   independent noise datasets
//! - Results are reproducible from the seed alone

use lagscan_core::{CorrelationMethod, ExecutionMode};
use lagscan_resampling::{ResamplingConfig, ResamplingEngine, ResamplingMethod};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Helper Functions
// ============================================================================

fn independent_uniform(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let y: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    (x, y)
}

// ============================================================================
// Permutation
// ============================================================================

#[test]
fn permutation_on_ten_thousand_independent_pairs_is_not_significant() {
    let (x, y) = independent_uniform(10_000, 42);
    let engine = ResamplingEngine::new(
        ResamplingConfig::new(10_000).with_execution(ExecutionMode::Parallel),
    );

    let result = engine
        .permutation_test_method(&x, &y, CorrelationMethod::Pearson, 42)
        .unwrap();

    assert_eq!(result.method, ResamplingMethod::Permutation);
    assert_eq!(result.iterations, 10_000);
    assert!(!result.truncated);
    assert!(
        result.empirical_sigma < 3.0,
        "sigma was {} (p = {})",
        result.empirical_sigma,
        result.empirical_p
    );
}

#[test]
fn permutation_p_value_is_reproducible() {
    let (x, y) = independent_uniform(300, 7);
    let engine = ResamplingEngine::new(ResamplingConfig::new(1_000));

    let first = engine
        .permutation_test_method(&x, &y, CorrelationMethod::Kendall, 99)
        .unwrap();
    let second = engine
        .permutation_test_method(&x, &y, CorrelationMethod::Kendall, 99)
        .unwrap();

    assert_eq!(first.empirical_p, second.empirical_p);
    assert_eq!(first, second);
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn bootstrap_false_positive_rate_is_controlled() {
    let engine = ResamplingEngine::new(
        ResamplingConfig::new(400).with_execution(ExecutionMode::Parallel),
    );

    let datasets = 40;
    let below_three_sigma = (0..datasets)
        .filter(|&i| {
            let (x, y) = independent_uniform(150, 1_000 + i);
            let result = engine
                .bootstrap_method(&x, &y, CorrelationMethod::Pearson, i)
                .unwrap();
            result.empirical_sigma < 3.0
        })
        .count();

    assert!(
        below_three_sigma as f64 >= 0.95 * datasets as f64,
        "only {below_three_sigma} of {datasets} stayed below 3 sigma"
    );
}

#[test]
fn bootstrap_result_round_trips_through_json() {
    let (x, y) = independent_uniform(100, 3);
    let result = ResamplingEngine::new(ResamplingConfig::new(200))
        .bootstrap_method(&x, &y, CorrelationMethod::Spearman, 3)
        .unwrap();

    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"method\":\"bootstrap\""), "json was {json}");
    let back: lagscan_resampling::ResamplingResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.iterations, result.iterations);
    assert_eq!(back.exceedance_count, result.exceedance_count);
    assert!((back.empirical_sigma - result.empirical_sigma).abs() < 1e-12);
    assert!(back.confidence_interval.is_some());
}
