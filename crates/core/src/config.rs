use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::correlation::CorrelationMethod;
use crate::error::{EngineError, Result};
use crate::significance::DEFAULT_SIGMA_CEILING;

/// How independent trials or partitions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One after another on the calling thread.
    #[default]
    Sequential,
    /// On rayon's global thread pool. Output is identical to sequential.
    Parallel,
}

/// Top-level engine configuration.
///
/// Every field has a default so partial configuration files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Correlation statistic used by scans, resampling and combination.
    pub method: CorrelationMethod,
    /// Resampling iterations.
    pub iterations: usize,
    /// Sigma ceiling for the significance converter.
    pub ceiling: f64,
    /// Minimum partition size; `None` uses the method's default.
    pub min_partition_size: Option<usize>,
    /// Largest tolerated outlier fraction for robust regression.
    pub max_outlier_fraction: f64,
    /// Master seed for every stochastic stage.
    pub rng_seed: u64,
    /// Significance level for multiple-testing correction.
    pub alpha: f64,
    /// Sequential or parallel evaluation.
    pub execution: ExecutionMode,
    /// Optional wall-clock budget for a resampling run, in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Spearman,
            iterations: 10_000,
            ceiling: DEFAULT_SIGMA_CEILING,
            min_partition_size: None,
            max_outlier_fraction: 0.5,
            rng_seed: 42,
            alpha: 0.05,
            execution: ExecutionMode::Sequential,
            time_budget_ms: None,
        }
    }
}

impl EngineConfig {
    /// Checks every field is in range.
    ///
    /// # Errors
    /// Returns `InvalidInput` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(EngineError::InvalidInput(
                "iterations must be at least 1".to_string(),
            ));
        }
        if !self.ceiling.is_finite() || self.ceiling <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "ceiling must be positive and finite, got {}",
                self.ceiling
            )));
        }
        if let Some(min) = self.min_partition_size {
            if min < crate::dataset::MIN_SAMPLES {
                return Err(EngineError::InvalidInput(format!(
                    "min_partition_size must be at least {}, got {min}",
                    crate::dataset::MIN_SAMPLES
                )));
            }
        }
        if !(self.max_outlier_fraction > 0.0 && self.max_outlier_fraction < 1.0) {
            return Err(EngineError::InvalidInput(format!(
                "max_outlier_fraction must be in (0, 1), got {}",
                self.max_outlier_fraction
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(EngineError::InvalidInput(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.time_budget_ms == Some(0) {
            return Err(EngineError::InvalidInput(
                "time_budget_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Time budget as a `Duration`.
    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_method(mut self, method: CorrelationMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }
}
