//! Outlier-robust straight-line fitting (RANSAC).
//!
//! Candidate lines through two randomly drawn points are scored by how
//! many points lie within a residual threshold of them. The best candidate
//! (most inliers, then smallest inlier sum of squares) is refit by ordinary
//! least squares on its inliers.
//!
//! The candidate search depends only on the data, the configuration and
//! the seed. `max_outlier_fraction` is applied afterwards as an acceptance
//! test, so raising it can only turn a failure into a success, never change
//! the fit that is returned.

use lagscan_core::{EngineConfig, EngineError, Result, MIN_SAMPLES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::quantile::median_absolute_deviation;

/// Smallest residual threshold relative to the largest `|y|`, so that an
/// exactly constant `y` still has its points classified as inliers.
const MAD_FLOOR_RELATIVE: f64 = 1e-9;

/// Configuration for robust regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Candidate fits to evaluate.
    pub max_trials: usize,
    /// Fixed inlier threshold. `None` uses the MAD of `y`.
    pub residual_threshold: Option<f64>,
    /// Fitted slopes with magnitude at or below this are flagged degenerate.
    pub slope_epsilon: f64,
    /// Outlier tolerance used by [`RobustRegressor::fit_default`].
    pub max_outlier_fraction: f64,
    /// Seed used by [`RobustRegressor::fit_default`].
    pub seed: u64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            max_trials: 1_000,
            residual_threshold: None,
            slope_epsilon: 1e-10,
            max_outlier_fraction: 0.5,
            seed: 42,
        }
    }
}

impl From<&EngineConfig> for RegressionConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_outlier_fraction: config.max_outlier_fraction,
            seed: config.rng_seed,
            ..Self::default()
        }
    }
}

impl RegressionConfig {
    #[must_use]
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    #[must_use]
    pub fn with_residual_threshold(mut self, threshold: f64) -> Self {
        self.residual_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_slope_epsilon(mut self, epsilon: f64) -> Self {
        self.slope_epsilon = epsilon;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            return Err(EngineError::InvalidInput(
                "max_trials must be at least 1".to_string(),
            ));
        }
        if let Some(threshold) = self.residual_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "residual_threshold must be finite and non-negative, got {threshold}"
                )));
            }
        }
        if !self.slope_epsilon.is_finite() || self.slope_epsilon < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "slope_epsilon must be finite and non-negative, got {}",
                self.slope_epsilon
            )));
        }
        Ok(())
    }
}

/// A robust line fit `y = slope * x + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub slope: f64,
    pub intercept: f64,
    /// Per-point inlier flag, in input order.
    pub inlier_mask: Vec<bool>,
    pub inlier_ratio: f64,
    pub n_inliers: usize,
    pub residual_threshold: f64,
    /// Candidate fits evaluated.
    pub trials: usize,
    /// True when `|slope|` is within `slope_epsilon` of zero. Quantities
    /// derived by dividing by the slope are meaningless in that case.
    pub degenerate_slope: bool,
    /// Ordinary least-squares slope over every point, for comparison.
    pub ols_slope: f64,
    pub ols_intercept: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    slope: f64,
    intercept: f64,
    inliers: usize,
    sse: f64,
}

impl Candidate {
    fn beats(&self, other: &Self) -> bool {
        self.inliers > other.inliers || (self.inliers == other.inliers && self.sse < other.sse)
    }
}

/// RANSAC line fitter.
#[derive(Debug, Clone, Default)]
pub struct RobustRegressor {
    config: RegressionConfig,
}

impl RobustRegressor {
    /// Creates a new regressor with the given configuration.
    #[must_use]
    pub fn new(config: RegressionConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    /// Fits with the configured `max_outlier_fraction` and seed.
    ///
    /// # Errors
    /// See [`RobustRegressor::fit`].
    pub fn fit_default(&self, x: &[f64], y: &[f64]) -> Result<RegressionResult> {
        self.fit(x, y, self.config.max_outlier_fraction, self.config.seed)
    }

    /// Fits a line tolerating up to `max_outlier_fraction` outliers.
    ///
    /// # Errors
    /// - `InsufficientSample` for mismatched lengths or fewer than 3 points
    /// - `InvalidInput` for non-finite data, a fraction outside `(0, 1)` or
    ///   an invalid configuration
    /// - `DegenerateDistribution` when every `x` is equal
    /// - `NonConvergentRegression` when the best inlier ratio is below
    ///   `1 - max_outlier_fraction`
    pub fn fit(
        &self,
        x: &[f64],
        y: &[f64],
        max_outlier_fraction: f64,
        seed: u64,
    ) -> Result<RegressionResult> {
        self.config.validate()?;
        validate_fraction(max_outlier_fraction)?;
        validate_points(x, y)?;

        let n = x.len();
        let threshold = self.threshold(y);
        tracing::debug!(
            n,
            threshold,
            max_trials = self.config.max_trials,
            seed,
            "starting robust regression"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut best: Option<Candidate> = None;
        let mut trials = 0;

        while trials < self.config.max_trials {
            trials += 1;

            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            if x[i] == x[j] {
                continue;
            }

            let slope = (y[j] - y[i]) / (x[j] - x[i]);
            let intercept = y[i] - slope * x[i];
            if !slope.is_finite() || !intercept.is_finite() {
                continue;
            }

            let (inliers, sse) = score(x, y, slope, intercept, threshold);
            let candidate = Candidate {
                slope,
                intercept,
                inliers,
                sse,
            };
            if best.map_or(true, |b| candidate.beats(&b)) {
                best = Some(candidate);
            }
            if inliers == n {
                break;
            }
        }

        let required_ratio = 1.0 - max_outlier_fraction;
        let Some(best) = best else {
            return Err(EngineError::NonConvergentRegression {
                best_ratio: 0.0,
                required_ratio,
                trials,
            });
        };

        let inlier_ratio = best.inliers as f64 / n as f64;
        if inlier_ratio < required_ratio {
            tracing::debug!(inlier_ratio, required_ratio, trials, "regression did not converge");
            return Err(EngineError::NonConvergentRegression {
                best_ratio: inlier_ratio,
                required_ratio,
                trials,
            });
        }

        let inlier_mask: Vec<bool> = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| (yi - (best.slope * xi + best.intercept)).abs() <= threshold)
            .collect();
        let (slope, intercept) = least_squares(x, y, &inlier_mask)
            .unwrap_or((best.slope, best.intercept));

        let (ols_slope, ols_intercept) = ordinary_fit(x, y)?;

        let degenerate_slope = slope.abs() <= self.config.slope_epsilon;
        if degenerate_slope {
            tracing::warn!(slope, "fitted slope is numerically zero");
        }

        Ok(RegressionResult {
            slope,
            intercept,
            inlier_mask,
            inlier_ratio,
            n_inliers: best.inliers,
            residual_threshold: threshold,
            trials,
            degenerate_slope,
            ols_slope,
            ols_intercept,
        })
    }

    fn threshold(&self, y: &[f64]) -> f64 {
        if let Some(threshold) = self.config.residual_threshold {
            return threshold;
        }
        let scale = y.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        median_absolute_deviation(y).max(MAD_FLOOR_RELATIVE * scale)
    }
}

fn validate_fraction(max_outlier_fraction: f64) -> Result<()> {
    if !(max_outlier_fraction > 0.0 && max_outlier_fraction < 1.0) {
        return Err(EngineError::InvalidInput(format!(
            "max_outlier_fraction must be in (0, 1), got {max_outlier_fraction}"
        )));
    }
    Ok(())
}

fn validate_points(x: &[f64], y: &[f64]) -> Result<()> {
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
            "regression inputs must be finite".to_string(),
        ));
    }
    if x.iter().all(|&v| v == x[0]) {
        return Err(EngineError::DegenerateDistribution(
            "all x values are equal".to_string(),
        ));
    }
    Ok(())
}

/// Inlier count and inlier sum of squared residuals.
fn score(x: &[f64], y: &[f64], slope: f64, intercept: f64, threshold: f64) -> (usize, f64) {
    x.iter()
        .zip(y)
        .map(|(xi, yi)| yi - (slope * xi + intercept))
        .filter(|r| r.abs() <= threshold)
        .fold((0, 0.0), |(count, sse), r| (count + 1, sse + r * r))
}

/// Ordinary least-squares line `(slope, intercept)` through every point.
///
/// # Errors
/// `InsufficientSample` for mismatched lengths or fewer than 3 points,
/// `InvalidInput` for non-finite data, `DegenerateDistribution` when every
/// `x` is equal.
pub fn ordinary_fit(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    validate_points(x, y)?;
    least_squares(x, y, &vec![true; x.len()]).ok_or_else(|| {
        EngineError::DegenerateDistribution("x has zero variance".to_string())
    })
}

/// Ordinary least squares over the masked points.
fn least_squares(x: &[f64], y: &[f64], mask: &[bool]) -> Option<(f64, f64)> {
    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|((&xi, &yi), _)| (xi, yi))
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (xi, yi)| {
        let dx = xi - mean_x;
        (sxy + dx * (yi - mean_y), sxx + dx * dx)
    });
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
