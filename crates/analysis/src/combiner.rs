//! Combination of correlation results across independent sources and
//! multiple-testing correction of their p-values.

use lagscan_core::{
    CorrelationCalculator, CorrelationMethod, CorrelationResult, Dataset, EngineConfig,
    EngineError, Result, SignificanceConverter, DEFAULT_SIGMA_CEILING,
};
use serde::{Deserialize, Serialize};

/// Multiple-testing correction procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    /// False discovery rate control (step-up).
    #[default]
    BenjaminiHochberg,
    /// Family-wise error control, `min(1, m * p)`.
    Bonferroni,
}

/// Configuration for combination and correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinerConfig {
    /// Significance level of the correction.
    pub alpha: f64,
    /// Correction applied to per-source p-values.
    pub correction: CorrectionMethod,
    /// Sigma ceiling.
    pub ceiling: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            correction: CorrectionMethod::BenjaminiHochberg,
            ceiling: DEFAULT_SIGMA_CEILING,
        }
    }
}

impl From<&EngineConfig> for CombinerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            alpha: config.alpha,
            ceiling: config.ceiling,
            ..Self::default()
        }
    }
}

impl CombinerConfig {
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    #[must_use]
    pub fn with_correction(mut self, correction: CorrectionMethod) -> Self {
        self.correction = correction;
        self
    }
}

/// Corrected p-values and rejection decisions, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdrCorrection {
    pub rejected: Vec<bool>,
    pub corrected_p: Vec<f64>,
    pub alpha: f64,
    pub method: CorrectionMethod,
}

impl FdrCorrection {
    /// Number of rejected hypotheses.
    #[must_use]
    pub fn n_rejected(&self) -> usize {
        self.rejected.iter().filter(|&&r| r).count()
    }
}

/// A source that could not contribute to a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

/// Weighted combination of per-source correlations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    /// Statistic shared by every source.
    pub method: CorrelationMethod,
    pub source_ids: Vec<String>,
    pub per_source: Vec<CorrelationResult>,
    /// Normalized weights, summing to one.
    pub weights: Vec<f64>,
    pub combined_statistic: f64,
    /// Sum of per-source sample sizes.
    pub pooled_n: usize,
    pub combined_p: f64,
    pub combined_sigma: f64,
    pub capped: bool,
    /// Per-source p-values after correction.
    pub corrected_p_values: Vec<f64>,
    pub rejected: Vec<bool>,
    pub alpha: f64,
    pub failures: Vec<SourceFailure>,
}

/// Combines results from independent sources.
#[derive(Debug, Clone, Default)]
pub struct MultiSourceCombiner {
    config: CombinerConfig,
}

impl MultiSourceCombiner {
    /// Creates a new combiner with the given configuration.
    #[must_use]
    pub fn new(config: CombinerConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Weighted average of the statistics, with a combined significance
    /// from the pooled sample size.
    ///
    /// # Errors
    /// - `EmptyInput` if `results` is empty
    /// - `InvalidInput` if `weights` differs in length, holds a negative or
    ///   non-finite value, or sums to zero, or if the results mix methods
    pub fn combine(&self, results: &[CorrelationResult], weights: &[f64]) -> Result<CombinedResult> {
        let source_ids = (0..results.len()).map(|i| format!("source_{i}")).collect();
        self.combine_labelled(source_ids, results.to_vec(), weights, Vec::new())
    }

    /// Combines with weights proportional to sample size.
    ///
    /// # Errors
    /// See [`MultiSourceCombiner::combine`].
    pub fn combine_by_sample_size(&self, results: &[CorrelationResult]) -> Result<CombinedResult> {
        let weights: Vec<f64> = results.iter().map(|r| r.n as f64).collect();
        self.combine(results, &weights)
    }

    /// Computes `method` between energy and time for every dataset and
    /// combines the successes weighted by sample size.
    ///
    /// Datasets that fail are listed in `failures` and left out.
    ///
    /// # Errors
    /// `EmptyInput` if no dataset yields a result.
    pub fn combine_datasets(
        &self,
        datasets: &[Dataset],
        method: CorrelationMethod,
    ) -> Result<CombinedResult> {
        let calculator = CorrelationCalculator::new(self.converter()?);

        let mut source_ids = Vec::new();
        let mut results = Vec::new();
        let mut failures = Vec::new();
        for dataset in datasets {
            match calculator.compute(method, &dataset.energies(), &dataset.times()) {
                Ok(result) => {
                    source_ids.push(dataset.source_id().to_string());
                    results.push(result);
                }
                Err(e) => {
                    tracing::warn!(
                        source = dataset.source_id(),
                        error = %e,
                        "dataset left out of combination"
                    );
                    failures.push(SourceFailure {
                        source_id: dataset.source_id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if results.is_empty() {
            return Err(EngineError::EmptyInput(format!(
                "none of {} datasets produced a correlation",
                datasets.len()
            )));
        }

        let weights: Vec<f64> = results.iter().map(|r| r.n as f64).collect();
        self.combine_labelled(source_ids, results, &weights, failures)
    }

    /// Corrects `p_values` with the configured procedure at `alpha`.
    ///
    /// # Errors
    /// `EmptyInput` for no p-values, `InvalidInput` for a p-value outside
    /// `[0, 1]` or `alpha` outside `(0, 1)`.
    pub fn correct(&self, p_values: &[f64], alpha: f64) -> Result<FdrCorrection> {
        match self.config.correction {
            CorrectionMethod::BenjaminiHochberg => benjamini_hochberg(p_values, alpha),
            CorrectionMethod::Bonferroni => bonferroni(p_values, alpha),
        }
    }

    fn converter(&self) -> Result<SignificanceConverter> {
        SignificanceConverter::with_ceiling(self.config.ceiling)
    }

    fn combine_labelled(
        &self,
        source_ids: Vec<String>,
        per_source: Vec<CorrelationResult>,
        weights: &[f64],
        failures: Vec<SourceFailure>,
    ) -> Result<CombinedResult> {
        if per_source.is_empty() {
            return Err(EngineError::EmptyInput(
                "no results to combine".to_string(),
            ));
        }
        let method = per_source[0].method;
        if let Some(other) = per_source.iter().find(|r| r.method != method) {
            return Err(EngineError::InvalidInput(format!(
                "cannot combine {method} with {} results",
                other.method
            )));
        }
        let weights = normalize_weights(weights, per_source.len())?;
        let converter = self.converter()?;

        let combined_statistic = per_source
            .iter()
            .zip(&weights)
            .map(|(r, w)| r.statistic * w)
            .sum::<f64>()
            .clamp(-1.0, 1.0);
        let pooled_n: usize = per_source.iter().map(|r| r.n).sum();
        let combined_p = method.p_value_for(combined_statistic, pooled_n);
        let significance = converter.to_sigma(combined_p);

        let p_values: Vec<f64> = per_source.iter().map(|r| r.p_value).collect();
        let correction = self.correct(&p_values, self.config.alpha)?;

        if significance.capped {
            tracing::warn!(
                sources = per_source.len(),
                pooled_n,
                "combined significance capped at ceiling"
            );
        }
        tracing::info!(
            sources = per_source.len(),
            failed = failures.len(),
            combined_statistic,
            pooled_n,
            combined_sigma = significance.sigma,
            rejected = correction.n_rejected(),
            "sources combined"
        );

        Ok(CombinedResult {
            method,
            source_ids,
            per_source,
            weights,
            combined_statistic,
            pooled_n,
            combined_p,
            combined_sigma: significance.sigma,
            capped: significance.capped,
            corrected_p_values: correction.corrected_p,
            rejected: correction.rejected,
            alpha: correction.alpha,
            failures,
        })
    }
}

fn normalize_weights(weights: &[f64], expected: usize) -> Result<Vec<f64>> {
    if weights.len() != expected {
        return Err(EngineError::InvalidInput(format!(
            "expected {expected} weights, got {}",
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EngineError::InvalidInput(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(EngineError::InvalidInput(
            "weights must have a positive finite sum".to_string(),
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

fn validate_p_values(p_values: &[f64], alpha: f64) -> Result<()> {
    if p_values.is_empty() {
        return Err(EngineError::EmptyInput(
            "no p-values to correct".to_string(),
        ));
    }
    if let Some(p) = p_values.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(EngineError::InvalidInput(format!(
            "p-values must lie in [0, 1], got {p}"
        )));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(EngineError::InvalidInput(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }
    Ok(())
}

/// Benjamini-Hochberg step-up procedure.
///
/// Rejects every hypothesis ranked at or below the largest `k` with
/// `p_(k) <= k / m * alpha`. Adjusted p-values are the running minimum of
/// `m / j * p_(j)` taken from the largest p downwards, capped at 1.
///
/// # Errors
/// See [`MultiSourceCombiner::correct`].
pub fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> Result<FdrCorrection> {
    validate_p_values(p_values, alpha)?;

    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let cutoff = order
        .iter()
        .enumerate()
        .filter(|&(rank, &i)| p_values[i] <= (rank + 1) as f64 / m as f64 * alpha)
        .map(|(rank, _)| rank + 1)
        .last()
        .unwrap_or(0);

    let mut rejected = vec![false; m];
    for &i in &order[..cutoff] {
        rejected[i] = true;
    }

    let mut corrected_p = vec![1.0; m];
    let mut running_min = 1.0_f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let p = p_values[i];
        // never below the raw p, which p * m / m can undershoot by an ulp
        let adjusted = (p * m as f64 / (rank + 1) as f64).max(p);
        running_min = running_min.min(adjusted);
        corrected_p[i] = running_min;
    }

    Ok(FdrCorrection {
        rejected,
        corrected_p,
        alpha,
        method: CorrectionMethod::BenjaminiHochberg,
    })
}

/// Bonferroni correction.
///
/// # Errors
/// See [`MultiSourceCombiner::correct`].
pub fn bonferroni(p_values: &[f64], alpha: f64) -> Result<FdrCorrection> {
    validate_p_values(p_values, alpha)?;

    let m = p_values.len() as f64;
    let corrected_p: Vec<f64> = p_values.iter().map(|p| (p * m).min(1.0)).collect();
    let rejected = corrected_p.iter().map(|&p| p <= alpha).collect();

    Ok(FdrCorrection {
        rejected,
        corrected_p,
        alpha,
        method: CorrectionMethod::Bonferroni,
    })
}
