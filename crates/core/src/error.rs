//! Error taxonomy shared by every stage of the significance engine.
//!
//! All variants describe local, detectable preconditions. Numeric edge
//! cases that arise from extreme but valid data (p-value underflow, a
//! near-zero fitted slope) are not errors; they are reported through the
//! `capped` and `degenerate_slope` flags on the result types instead.

use thiserror::Error;

/// Errors raised by correlation, resampling, regression, scanning and
/// combination operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Fewer samples than the requested statistic needs, or paired inputs
    /// of different lengths.
    #[error("Insufficient samples: need at least {required}, got {actual}")]
    InsufficientSample {
        /// Minimum number of samples required.
        required: usize,
        /// Number of samples supplied.
        actual: usize,
    },

    /// Zero-variance input to a statistic that requires variance.
    #[error("Degenerate distribution: {0}")]
    DegenerateDistribution(String),

    /// RANSAC could not reach the required inlier ratio.
    #[error(
        "Robust regression did not converge: best inlier ratio {best_ratio:.3} \
         below required {required_ratio:.3} after {trials} trials"
    )]
    NonConvergentRegression {
        /// Best inlier ratio reached by any candidate.
        best_ratio: f64,
        /// Inlier ratio required by the caller.
        required_ratio: f64,
        /// Number of candidate fits evaluated.
        trials: usize,
    },

    /// Combination or correction called with nothing to work on.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Malformed arguments: non-finite values, bad weights, out-of-range
    /// configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Shorthand for the paired-length / minimum-size precondition.
    #[must_use]
    pub fn insufficient(required: usize, actual: usize) -> Self {
        Self::InsufficientSample { required, actual }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
