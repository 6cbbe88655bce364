//! Seeded trial execution shared by permutation and bootstrap resampling.
//!
//! Trial `i` draws from `ChaCha8Rng::seed_from_u64(seed)` on stream `i`,
//! so every trial's randomness is fixed by `(seed, i)` alone. Sequential
//! and parallel runs therefore evaluate identical trials and, because
//! results are collected in trial order, produce identical output.

use lagscan_core::{
    correlation_statistic, CorrelationMethod, EngineError, ExecutionMode, Result,
    SignificanceConverter, MIN_SAMPLES,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::ResamplingConfig;
use crate::summary::NullDistributionSummary;
use crate::{bootstrap, permutation};

/// Resampling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Pairs drawn with replacement.
    Bootstrap,
    /// `y` shuffled against fixed `x`.
    Permutation,
}

/// Outcome of a resampling run.
///
/// When `truncated` is true, `iterations` is below `requested_iterations`
/// and `empirical_p` only reflects the completed trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResamplingResult {
    pub method: ResamplingMethod,
    /// Trials that produced a statistic.
    pub iterations: usize,
    pub requested_iterations: usize,
    /// Trials whose statistic could not be computed (e.g. a constant resample).
    pub skipped_trials: usize,
    pub observed_statistic: f64,
    pub null_distribution_summary: NullDistributionSummary,
    pub empirical_p: f64,
    /// True when no trial exceeded the observed statistic and `empirical_p`
    /// is the resolution limit `1 / iterations`.
    pub p_is_upper_bound: bool,
    pub empirical_sigma: f64,
    pub capped: bool,
    pub exceedance_count: usize,
    /// Percentile interval of the bootstrap distribution.
    pub confidence_interval: Option<(f64, f64)>,
    pub truncated: bool,
}

impl ResamplingResult {
    /// Fraction of the requested trials that completed.
    #[must_use]
    pub fn completed_fraction(&self) -> f64 {
        if self.requested_iterations == 0 {
            return 0.0;
        }
        self.iterations as f64 / self.requested_iterations as f64
    }
}

/// Statistics of the trials that completed.
#[derive(Debug, Clone)]
pub(crate) struct TrialRun {
    pub statistics: Vec<f64>,
    pub skipped: usize,
    pub requested: usize,
    pub truncated: bool,
}

impl TrialRun {
    pub fn summary(&self) -> NullDistributionSummary {
        NullDistributionSummary::from_values(&self.statistics)
    }
}

/// Runs permutation and bootstrap resampling.
#[derive(Debug, Clone, Default)]
pub struct ResamplingEngine {
    config: ResamplingConfig,
}

impl ResamplingEngine {
    /// Creates a new engine with the given configuration.
    #[must_use]
    pub fn new(config: ResamplingConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ResamplingConfig::default())
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ResamplingConfig {
        &self.config
    }

    /// Permutation test of `statistic_fn` on `(x, y)`.
    ///
    /// Each trial shuffles a copy of `y` and counts
    /// `|statistic| >= |observed|`.
    ///
    /// # Errors
    /// `InsufficientSample` for mismatched or short inputs, `InvalidInput`
    /// for non-finite values, a non-finite observed statistic or an invalid
    /// configuration,
    /// `DegenerateDistribution` if the observed statistic or every trial
    /// fails. Errors from `statistic_fn` on the observed data propagate.
    pub fn permutation_test<F>(
        &self,
        x: &[f64],
        y: &[f64],
        statistic_fn: F,
        seed: u64,
    ) -> Result<ResamplingResult>
    where
        F: Fn(&[f64], &[f64]) -> Result<f64> + Sync,
    {
        let converter = self.prepare(x, y)?;
        let observed = observed_statistic(&statistic_fn, x, y)?;
        tracing::debug!(
            n = x.len(),
            iterations = self.config.iterations,
            seed,
            observed,
            "starting permutation test"
        );

        let run = self.run_trials(seed, |rng| {
            permutation::shuffled_trial(x, y, &statistic_fn, rng)
        })?;
        let result = permutation::summarize(observed, run, &converter);
        self.report(&result);
        Ok(result)
    }

    /// Bootstrap of `statistic_fn` on `(x, y)`, resampling pairs with
    /// replacement.
    ///
    /// # Errors
    /// Same conditions as [`ResamplingEngine::permutation_test`].
    pub fn bootstrap<F>(
        &self,
        x: &[f64],
        y: &[f64],
        statistic_fn: F,
        seed: u64,
    ) -> Result<ResamplingResult>
    where
        F: Fn(&[f64], &[f64]) -> Result<f64> + Sync,
    {
        let converter = self.prepare(x, y)?;
        let observed = observed_statistic(&statistic_fn, x, y)?;
        tracing::debug!(
            n = x.len(),
            iterations = self.config.iterations,
            seed,
            observed,
            "starting bootstrap"
        );

        let run = self.run_trials(seed, |rng| {
            bootstrap::resampled_trial(x, y, &statistic_fn, rng)
        })?;
        let result = bootstrap::summarize(
            observed,
            run,
            self.config.confidence_level,
            &converter,
        );
        self.report(&result);
        Ok(result)
    }

    /// Permutation test of a correlation coefficient.
    ///
    /// # Errors
    /// See [`ResamplingEngine::permutation_test`].
    pub fn permutation_test_method(
        &self,
        x: &[f64],
        y: &[f64],
        method: CorrelationMethod,
        seed: u64,
    ) -> Result<ResamplingResult> {
        self.permutation_test(x, y, |a, b| correlation_statistic(method, a, b), seed)
    }

    /// Bootstrap of a correlation coefficient.
    ///
    /// # Errors
    /// See [`ResamplingEngine::permutation_test`].
    pub fn bootstrap_method(
        &self,
        x: &[f64],
        y: &[f64],
        method: CorrelationMethod,
        seed: u64,
    ) -> Result<ResamplingResult> {
        self.bootstrap(x, y, |a, b| correlation_statistic(method, a, b), seed)
    }

    fn prepare(&self, x: &[f64], y: &[f64]) -> Result<SignificanceConverter> {
        self.config.validate()?;
        if x.len() != y.len() {
            return Err(EngineError::insufficient(
                x.len().max(y.len()),
                x.len().min(y.len()),
            ));
        }
        if x.len() < MIN_SAMPLES {
            return Err(EngineError::insufficient(MIN_SAMPLES, x.len()));
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidInput(
                "resampling inputs must be finite".to_string(),
            ));
        }
        SignificanceConverter::with_ceiling(self.config.ceiling)
    }

    /// Runs up to `iterations` trials in chunks, honouring the time budget.
    pub(crate) fn run_trials<T>(&self, seed: u64, trial: T) -> Result<TrialRun>
    where
        T: Fn(&mut ChaCha8Rng) -> Option<f64> + Sync,
    {
        let requested = self.config.iterations;
        let chunk_size = self.config.chunk_size;
        let started = Instant::now();

        let mut statistics = Vec::with_capacity(requested);
        let mut skipped = 0;
        let mut truncated = false;
        let mut start = 0;

        while start < requested {
            let end = (start + chunk_size).min(requested);
            let chunk: Vec<Option<f64>> = match self.config.execution {
                ExecutionMode::Sequential => (start..end)
                    .map(|i| trial(&mut trial_rng(seed, i)))
                    .collect(),
                ExecutionMode::Parallel => (start..end)
                    .into_par_iter()
                    .map(|i| trial(&mut trial_rng(seed, i)))
                    .collect(),
            };

            for value in chunk {
                match value {
                    Some(v) => statistics.push(v),
                    None => skipped += 1,
                }
            }
            start = end;

            if let Some(budget) = self.config.time_budget {
                if start < requested && started.elapsed() >= budget {
                    truncated = true;
                    tracing::warn!(
                        completed = start,
                        requested,
                        budget_ms = budget.as_millis() as u64,
                        "resampling stopped at time budget"
                    );
                    break;
                }
            }
        }

        if statistics.is_empty() {
            return Err(EngineError::DegenerateDistribution(format!(
                "all {skipped} resampling trials failed"
            )));
        }
        if skipped > 0 {
            tracing::warn!(skipped, "resampling trials skipped");
        }

        Ok(TrialRun {
            statistics,
            skipped,
            requested,
            truncated,
        })
    }

    fn report(&self, result: &ResamplingResult) {
        if result.capped {
            tracing::warn!(
                method = ?result.method,
                sigma = result.empirical_sigma,
                "empirical significance capped at ceiling"
            );
        }
        tracing::debug!(
            method = ?result.method,
            iterations = result.iterations,
            empirical_p = result.empirical_p,
            sigma = result.empirical_sigma,
            "resampling finished"
        );
    }
}

fn observed_statistic<F>(statistic_fn: &F, x: &[f64], y: &[f64]) -> Result<f64>
where
    F: Fn(&[f64], &[f64]) -> Result<f64>,
{
    let observed = statistic_fn(x, y)?;
    if !observed.is_finite() {
        return Err(EngineError::InvalidInput(format!(
            "observed statistic must be finite, got {observed}"
        )));
    }
    Ok(observed)
}

/// Independent generator for trial `index` under `seed`.
#[must_use]
pub fn trial_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}
