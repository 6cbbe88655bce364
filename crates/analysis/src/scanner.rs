//! Correlation scan over many partitions of one dataset.
//!
//! The scan reports every tested partition, the ones it skipped or failed
//! on, and the best partition together with the number of partitions it
//! was selected from. The best local significance is always accompanied
//! by a look-elsewhere corrected global p-value; it is never presented as
//! a single a-priori test.

use lagscan_core::{
    CorrelationCalculator, CorrelationMethod, CorrelationResult, Dataset, EngineConfig,
    ExecutionMode, Result, SignificanceConverter, DEFAULT_SIGMA_CEILING, MIN_SAMPLES,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::partition::{standard_search, Partition, PartitionGenerator};

/// Configuration for subset scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Statistic used by [`SubsetScanner::standard_scan`].
    pub method: CorrelationMethod,
    /// Smallest partition evaluated. `None` uses the method's default.
    pub min_partition_size: Option<usize>,
    /// Sigma ceiling.
    pub ceiling: f64,
    /// Sequential or rayon-parallel evaluation of partitions.
    pub execution: ExecutionMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::default(),
            min_partition_size: None,
            ceiling: DEFAULT_SIGMA_CEILING,
            execution: ExecutionMode::Sequential,
        }
    }
}

impl From<&EngineConfig> for ScanConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            method: config.method,
            min_partition_size: config.min_partition_size,
            ceiling: config.ceiling,
            execution: config.execution,
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn with_method(mut self, method: CorrelationMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_min_partition_size(mut self, min: usize) -> Self {
        self.min_partition_size = Some(min);
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Minimum size for `method`, never below three samples.
    #[must_use]
    pub fn min_size_for(&self, method: CorrelationMethod) -> usize {
        self.min_partition_size
            .unwrap_or_else(|| method.default_min_partition_size())
            .max(MIN_SAMPLES)
    }
}

/// Correlation within one tested partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetResult {
    pub partition: Partition,
    pub correlation: CorrelationResult,
    pub n_samples: usize,
}

/// A partition too small to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPartition {
    pub label: String,
    pub n_samples: usize,
    pub required: usize,
}

/// A partition whose evaluation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionFailure {
    pub label: String,
    pub error: String,
}

/// The most significant tested partition and its look-elsewhere penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSubset {
    /// Index into [`ScanReport::results`].
    pub index: usize,
    pub partition: Partition,
    pub local_sigma: f64,
    pub local_p: f64,
    /// Number of partitions the best was selected from.
    pub trials: usize,
    /// `1 - (1 - local_p)^trials`.
    pub global_p: f64,
    pub global_sigma: f64,
    /// True if either the local or global sigma hit the ceiling.
    pub capped: bool,
}

/// Outcome of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub source_id: String,
    pub method: CorrelationMethod,
    /// Tested partitions, in generator order.
    pub results: Vec<SubsetResult>,
    pub skipped: Vec<SkippedPartition>,
    pub failures: Vec<PartitionFailure>,
    pub partitions_total: usize,
    pub partitions_tested: usize,
    pub best: Option<BestSubset>,
}

impl ScanReport {
    /// Local p-values of the tested partitions, in result order.
    #[must_use]
    pub fn p_values(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.correlation.p_value).collect()
    }
}

enum Outcome {
    Tested(SubsetResult),
    Skipped(SkippedPartition),
    Failed(PartitionFailure),
}

/// Scans partitions of a dataset for correlation.
#[derive(Debug, Clone, Default)]
pub struct SubsetScanner {
    config: ScanConfig,
}

impl SubsetScanner {
    /// Creates a new scanner with the given configuration.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans the partitions produced by `generator`.
    ///
    /// # Errors
    /// See [`SubsetScanner::scan`].
    pub fn scan_with<G>(
        &self,
        dataset: &Dataset,
        generator: &G,
        method: CorrelationMethod,
    ) -> Result<ScanReport>
    where
        G: PartitionGenerator + ?Sized,
    {
        self.scan(dataset, &generator.partitions(dataset), method)
    }

    /// Runs [`standard_search`] with the configured method.
    ///
    /// # Errors
    /// See [`SubsetScanner::scan`].
    pub fn standard_scan(&self, dataset: &Dataset) -> Result<ScanReport> {
        self.scan_with(dataset, &standard_search(), self.config.method)
    }

    /// Computes `method` on every partition.
    ///
    /// Small partitions are skipped and failing ones recorded; neither
    /// stops the scan.
    ///
    /// # Errors
    /// Returns `InvalidInput` only for an invalid sigma ceiling.
    pub fn scan(
        &self,
        dataset: &Dataset,
        partitions: &[Partition],
        method: CorrelationMethod,
    ) -> Result<ScanReport> {
        let converter = SignificanceConverter::with_ceiling(self.config.ceiling)?;
        let calculator = CorrelationCalculator::new(converter);
        let min_size = self.config.min_size_for(method);
        tracing::debug!(
            source = dataset.source_id(),
            partitions = partitions.len(),
            %method,
            min_size,
            "starting subset scan"
        );

        let run = |partition: &Partition| {
            evaluate(&calculator, dataset, partition, method, min_size)
        };
        let outcomes: Vec<Outcome> = match self.config.execution {
            ExecutionMode::Sequential => partitions.iter().map(run).collect(),
            ExecutionMode::Parallel => partitions.par_iter().map(run).collect(),
        };

        let mut results = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Tested(result) => results.push(result),
                Outcome::Skipped(skip) => skipped.push(skip),
                Outcome::Failed(failure) => {
                    tracing::warn!(
                        source = dataset.source_id(),
                        partition = %failure.label,
                        error = %failure.error,
                        "partition evaluation failed"
                    );
                    failures.push(failure);
                }
            }
        }

        let partitions_tested = results.len();
        let best = best_subset(&results, &converter);
        if let Some(best) = &best {
            if best.capped {
                tracing::warn!(
                    source = dataset.source_id(),
                    partition = %best.partition.label,
                    "best partition significance capped at ceiling"
                );
            }
            tracing::info!(
                source = dataset.source_id(),
                partition = %best.partition.label,
                local_sigma = best.local_sigma,
                global_sigma = best.global_sigma,
                trials = best.trials,
                "subset scan complete"
            );
        } else {
            tracing::info!(
                source = dataset.source_id(),
                skipped = skipped.len(),
                failed = failures.len(),
                "subset scan found no testable partition"
            );
        }

        Ok(ScanReport {
            source_id: dataset.source_id().to_string(),
            method,
            results,
            skipped,
            failures,
            partitions_total: partitions.len(),
            partitions_tested,
            best,
        })
    }
}

fn evaluate(
    calculator: &CorrelationCalculator,
    dataset: &Dataset,
    partition: &Partition,
    method: CorrelationMethod,
    min_size: usize,
) -> Outcome {
    let (energies, times) = match partition.select(dataset) {
        Ok(columns) => columns,
        Err(e) => {
            return Outcome::Failed(PartitionFailure {
                label: partition.label.clone(),
                error: e.to_string(),
            });
        }
    };

    let n_samples = energies.len();
    if n_samples < min_size {
        return Outcome::Skipped(SkippedPartition {
            label: partition.label.clone(),
            n_samples,
            required: min_size,
        });
    }

    match calculator.compute(method, &energies, &times) {
        Ok(correlation) => Outcome::Tested(SubsetResult {
            partition: partition.clone(),
            correlation,
            n_samples,
        }),
        Err(e) => Outcome::Failed(PartitionFailure {
            label: partition.label.clone(),
            error: e.to_string(),
        }),
    }
}

/// Šidák look-elsewhere penalty `1 - (1 - p)^trials`.
///
/// Evaluated in log space so that tiny `p` does not round to zero.
#[must_use]
pub fn sidak_global_p(local_p: f64, trials: usize) -> f64 {
    if local_p.is_nan() {
        return 1.0;
    }
    let p = local_p.clamp(0.0, 1.0);
    if p >= 1.0 {
        return 1.0;
    }
    if trials <= 1 {
        return p;
    }
    (-(trials as f64 * (-p).ln_1p()).exp_m1()).clamp(0.0, 1.0)
}

fn best_subset(results: &[SubsetResult], converter: &SignificanceConverter) -> Option<BestSubset> {
    let (index, best) = results
        .iter()
        .enumerate()
        .fold(None, |acc: Option<(usize, &SubsetResult)>, (i, r)| match acc {
            Some((_, b)) if b.correlation.sigma >= r.correlation.sigma => acc,
            _ => Some((i, r)),
        })?;

    let trials = results.len();
    let local_p = best.correlation.p_value;
    let global_p = sidak_global_p(local_p, trials);
    let global = converter.to_sigma(global_p);

    Some(BestSubset {
        index,
        partition: best.partition.clone(),
        local_sigma: best.correlation.sigma,
        local_p,
        trials,
        global_p,
        global_sigma: global.sigma,
        capped: best.correlation.capped || global.capped,
    })
}
