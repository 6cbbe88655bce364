//! End-to-end analysis flows across the workspace crates.
//!
//! Verifies:
//! - A perfectly anti-correlated pair caps at the sigma ceiling
//! - Weighted combination of two sources
//! - Benjamini-Hochberg decisions on a fixed p-value list
//! - A hidden high-energy correlation is found by the standard search,
//!   survives the look-elsewhere correction and a permutation test
//! - RANSAC recovers an injected lag slope despite outliers

use lagscan_analysis::{
    benjamini_hochberg, standard_search, CombinerConfig, CorrectionMethod, MultiSourceCombiner,
    RegressionConfig, RobustRegressor, ScanConfig, SubsetScanner,
};
use lagscan_core::{
    compute, correlation_p_value, CorrelationMethod, CorrelationResult, Dataset, EnergyUnit,
    EngineConfig, ExecutionMode, Sample, SignificanceConverter,
};
use lagscan_resampling::{ResamplingConfig, ResamplingEngine};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Helper Functions
// ============================================================================

fn result_with(statistic: f64, n: usize) -> CorrelationResult {
    let p_value = correlation_p_value(statistic, n);
    let significance = SignificanceConverter::default().to_sigma(p_value);
    CorrelationResult {
        method: CorrelationMethod::Spearman,
        statistic,
        p_value,
        n,
        sigma: significance.sigma,
        capped: significance.capped,
    }
}

/// Uniform energies in GeV; the top energy decile arrives in exact energy
/// order, everything else at random times.
fn hidden_signal_dataset(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let samples = (0..n)
        .map(|_| {
            let energy = rng.gen_range(1.0..100.0);
            let time = if energy >= 90.1 {
                energy / 100.0
            } else {
                rng.gen::<f64>()
            };
            Sample::new(energy, time)
        })
        .collect();
    Dataset::new("GRB080916C", EnergyUnit::GeV, samples).unwrap()
}

fn noise_dataset(id: &str, n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let samples = (0..n)
        .map(|_| Sample::new(rng.gen_range(0.1..50.0), rng.gen_range(0.0..10.0)))
        .collect();
    Dataset::new(id, EnergyUnit::GeV, samples).unwrap()
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn perfect_anticorrelation_caps_at_ceiling() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0];
    let y = [5.0, 4.0, 3.0, 2.0, 1.0];

    let result = compute(CorrelationMethod::Pearson, &x, &y).unwrap();

    assert!((result.statistic + 1.0).abs() < 1e-12);
    assert_eq!(result.p_value, 0.0);
    assert!((result.sigma - 15.0).abs() < f64::EPSILON);
    assert!(result.capped);
}

#[test]
fn weighted_combination_of_two_sources() {
    let combined = MultiSourceCombiner::default()
        .combine(&[result_with(0.5, 100), result_with(-0.5, 10)], &[100.0, 10.0])
        .unwrap();

    assert!((combined.combined_statistic - 0.409).abs() < 1e-3);
    assert_eq!(combined.weights.len(), 2);
}

#[test]
fn benjamini_hochberg_on_reference_p_values() {
    let p_values = [0.001, 0.01, 0.04, 0.5];

    // k/m * alpha for k = 3 is 0.0375 < 0.04, so the step-up stops at two.
    let strict = benjamini_hochberg(&p_values, 0.05).unwrap();
    assert_eq!(strict.rejected, vec![true, true, false, false]);

    // The third p-value passes once 3/4 * alpha >= 0.04.
    let loose = MultiSourceCombiner::default().correct(&p_values, 0.06).unwrap();
    assert_eq!(loose.rejected, vec![true, true, true, false]);
    assert!(!loose.rejected[3]);
}

// ============================================================================
// Partition Scan
// ============================================================================

#[test]
fn standard_search_finds_hidden_high_energy_signal() {
    let dataset = hidden_signal_dataset(600, 7);
    let config = EngineConfig::default().with_execution(ExecutionMode::Parallel);
    let scanner = SubsetScanner::new(ScanConfig::from(&config));

    let report = scanner
        .scan_with(&dataset, &standard_search(), CorrelationMethod::Spearman)
        .unwrap();

    assert_eq!(report.partitions_total, 22);
    assert!(report.failures.is_empty());

    let best = report.best.clone().unwrap();
    assert_eq!(best.trials, report.partitions_tested);
    assert!(best.global_p >= best.local_p);
    assert!(best.global_sigma <= best.local_sigma);
    for result in &report.results {
        assert!(result.correlation.sigma <= best.local_sigma);
    }
    assert!(best.local_sigma > 5.0, "local sigma {}", best.local_sigma);

    // The winning partition holds up under a permutation test.
    let (energies, times) = best.partition.select(&dataset).unwrap();
    let engine = ResamplingEngine::new(ResamplingConfig::new(500));
    let null = engine
        .permutation_test_method(&energies, &times, CorrelationMethod::Spearman, 42)
        .unwrap();
    assert!(null.empirical_sigma > 2.5, "empirical sigma {}", null.empirical_sigma);
}

#[test]
fn scan_p_values_feed_fdr_correction() {
    let dataset = hidden_signal_dataset(600, 11);
    let report = SubsetScanner::default()
        .scan_with(&dataset, &standard_search(), CorrelationMethod::Kendall)
        .unwrap();

    let p_values = report.p_values();
    let combiner = MultiSourceCombiner::new(
        CombinerConfig::default().with_correction(CorrectionMethod::BenjaminiHochberg),
    );
    let correction = combiner.correct(&p_values, 0.05).unwrap();

    assert_eq!(correction.rejected.len(), report.partitions_tested);
    assert!(correction.n_rejected() >= 1);
    for (p, rejected) in p_values.iter().zip(&correction.rejected) {
        if *rejected {
            assert!(*p <= 0.05);
        }
    }
}

// ============================================================================
// Multi-Source Combination
// ============================================================================

#[test]
fn combine_datasets_weights_by_sample_size() {
    let datasets = vec![
        noise_dataset("GRB090510", 120, 1),
        noise_dataset("GRB090902B", 60, 2),
        noise_dataset("GRB130427A", 20, 3),
    ];

    let combined = MultiSourceCombiner::default()
        .combine_datasets(&datasets, CorrelationMethod::Pearson)
        .unwrap();

    assert_eq!(combined.pooled_n, 200);
    assert!(combined.failures.is_empty());
    assert!((combined.weights[0] - 0.6).abs() < 1e-12);
    assert!((combined.weights[1] - 0.3).abs() < 1e-12);
    assert!((combined.weights[2] - 0.1).abs() < 1e-12);
    assert!(combined.combined_sigma < 5.0);
}

// ============================================================================
// Robust Regression
// ============================================================================

#[test]
fn ransac_recovers_injected_lag_slope() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let energies: Vec<f64> = (0..200).map(|i| 0.1 + f64::from(i) * 0.05).collect();
    let mut times: Vec<f64> = energies
        .iter()
        .map(|e| 0.8 * e + 2.0 + rng.gen_range(-0.01..0.01))
        .collect();
    for time in times.iter_mut().step_by(10) {
        *time += rng.gen_range(20.0..40.0);
    }

    let regressor = RobustRegressor::new(RegressionConfig::default().with_max_trials(500));
    let fit = regressor.fit(&energies, &times, 0.3, 99).unwrap();

    assert!((fit.slope - 0.8).abs() < 0.01, "slope {}", fit.slope);
    assert!((fit.intercept - 2.0).abs() < 0.05, "intercept {}", fit.intercept);
    assert!(fit.inlier_ratio >= 0.85);
    assert!(!fit.degenerate_slope);
    for (k, inlier) in fit.inlier_mask.iter().enumerate() {
        if k % 10 == 0 {
            assert!(!inlier, "outlier {k} classified as inlier");
        }
    }
}
