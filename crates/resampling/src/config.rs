use lagscan_core::{EngineConfig, EngineError, ExecutionMode, Result, DEFAULT_SIGMA_CEILING};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trials evaluated between deadline checks.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Configuration for permutation and bootstrap resampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResamplingConfig {
    /// Number of trials requested.
    pub iterations: usize,
    /// Confidence level for the bootstrap percentile interval.
    pub confidence_level: f64,
    /// Sigma ceiling applied to empirical significance.
    pub ceiling: f64,
    /// Sequential or rayon-parallel trials.
    pub execution: ExecutionMode,
    /// Wall-clock budget; the run stops at the first chunk boundary past it.
    pub time_budget: Option<Duration>,
    /// Trials per chunk. Completed trials are always a whole number of
    /// chunks (plus the final partial one), independent of execution mode.
    pub chunk_size: usize,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            confidence_level: 0.95,
            ceiling: DEFAULT_SIGMA_CEILING,
            execution: ExecutionMode::Sequential,
            time_budget: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&EngineConfig> for ResamplingConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            iterations: config.iterations,
            ceiling: config.ceiling,
            execution: config.execution,
            time_budget: config.time_budget(),
            ..Self::default()
        }
    }
}

impl ResamplingConfig {
    /// Creates a configuration with the given trial count.
    #[must_use]
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_confidence_level(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidInput` for zero iterations or chunk size, or a
    /// confidence level outside `(0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(EngineError::InvalidInput(
                "resampling needs at least one iteration".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidInput(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(EngineError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }
}
