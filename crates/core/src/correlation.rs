//! Correlation statistics between paired sequences.
//!
//! Provides Pearson, Spearman and Kendall correlation with two-sided
//! p-values, and derives significance through the shared
//! [`SignificanceConverter`] policy.
//!
//! # P-values
//!
//! - Pearson and Spearman use the Student-t transform with `n - 2` degrees
//!   of freedom, evaluated as the regularized incomplete beta
//!   `I_{1-r^2}((n-2)/2, 1/2)`. This stays accurate deep into the tail and
//!   is exactly zero for a perfect correlation.
//! - Kendall uses the exact permutation distribution when there are no
//!   ties and `n <= 33`; otherwise the asymptotic normal approximation with
//!   tie-corrected variance. The asymptotic value is an approximation, not
//!   an exact p-value.

use serde::{Deserialize, Serialize};
use statrs::function::beta::beta_reg;
use statrs::function::erf::erfc;
use std::cmp::Ordering;
use std::f64::consts::SQRT_2;

use crate::dataset::MIN_SAMPLES;
use crate::error::{EngineError, Result};
use crate::significance::{Significance, SignificanceConverter};

/// Largest sample size for which Kendall's exact null distribution is used.
pub const KENDALL_EXACT_MAX_N: usize = 33;

/// Correlation statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    /// Product-moment correlation.
    Pearson,
    /// Pearson correlation of average ranks.
    #[default]
    Spearman,
    /// Kendall tau-b.
    Kendall,
}

impl CorrelationMethod {
    /// Every supported method.
    pub const ALL: [Self; 3] = [Self::Pearson, Self::Spearman, Self::Kendall];

    /// Smallest partition a subset scan evaluates with this method unless
    /// configured otherwise.
    #[must_use]
    pub fn default_min_partition_size(self) -> usize {
        match self {
            Self::Pearson => 30,
            Self::Spearman => 20,
            Self::Kendall => 10,
        }
    }

    /// Two-sided p-value of `statistic` over `n` untied pairs under this
    /// method's null distribution.
    ///
    /// Pearson and Spearman use [`correlation_p_value`]; Kendall uses
    /// [`kendall_p_value`].
    #[must_use]
    pub fn p_value_for(self, statistic: f64, n: usize) -> f64 {
        match self {
            Self::Pearson | Self::Spearman => correlation_p_value(statistic, n),
            Self::Kendall => kendall_p_value(statistic, n),
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::Kendall => "kendall",
        }
    }
}

impl std::fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a correlation test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Statistic used.
    pub method: CorrelationMethod,
    /// Correlation coefficient in `[-1, 1]`.
    pub statistic: f64,
    /// Two-sided p-value in `[0, 1]`.
    pub p_value: f64,
    /// Number of pairs.
    pub n: usize,
    /// Significance derived from `p_value`, finite and at most the ceiling.
    pub sigma: f64,
    /// True if `sigma` was clamped to the ceiling.
    pub capped: bool,
}

impl CorrelationResult {
    /// The sigma/capped pair.
    #[must_use]
    pub fn significance(&self) -> Significance {
        Significance {
            sigma: self.sigma,
            capped: self.capped,
        }
    }
}

/// Computes correlation results with a fixed significance policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationCalculator {
    converter: SignificanceConverter,
}

impl CorrelationCalculator {
    /// Creates a calculator using `converter` for sigma derivation.
    #[must_use]
    pub fn new(converter: SignificanceConverter) -> Self {
        Self { converter }
    }

    /// The significance converter in use.
    #[must_use]
    pub fn converter(&self) -> &SignificanceConverter {
        &self.converter
    }

    /// Computes the statistic, p-value and significance.
    ///
    /// # Errors
    /// `InsufficientSample` if lengths differ or `n < 3`,
    /// `InvalidInput` for non-finite values,
    /// `DegenerateDistribution` if either input is constant.
    pub fn compute(
        &self,
        method: CorrelationMethod,
        x: &[f64],
        y: &[f64],
    ) -> Result<CorrelationResult> {
        validate_pair(x, y)?;
        let n = x.len();

        let (statistic, p_value) = match method {
            CorrelationMethod::Pearson => {
                let r = pearson_r(x, y)?;
                (r, correlation_p_value(r, n))
            }
            CorrelationMethod::Spearman => {
                let r = spearman_rho(x, y)?;
                (r, correlation_p_value(r, n))
            }
            CorrelationMethod::Kendall => {
                let counts = kendall_counts(x, y)?;
                (counts.tau, counts.p_value(n))
            }
        };

        let significance = self.converter.to_sigma(p_value);
        tracing::trace!(
            %method,
            n,
            statistic,
            p_value,
            sigma = significance.sigma,
            "correlation computed"
        );

        Ok(CorrelationResult {
            method,
            statistic,
            p_value,
            n,
            sigma: significance.sigma,
            capped: significance.capped,
        })
    }

    /// Computes only the statistic, skipping the p-value.
    ///
    /// Used by resampling where only the coefficient of each replicate
    /// matters.
    ///
    /// # Errors
    /// Same preconditions as [`CorrelationCalculator::compute`].
    pub fn statistic(&self, method: CorrelationMethod, x: &[f64], y: &[f64]) -> Result<f64> {
        correlation_statistic(method, x, y)
    }
}

/// Computes a correlation result with the default sigma ceiling.
///
/// # Errors
/// See [`CorrelationCalculator::compute`].
///
/// # Examples
/// ```
/// use lagscan_core::correlation::{compute, CorrelationMethod};
///
/// let r = compute(CorrelationMethod::Pearson, &[1.0, 2.0, 3.0, 4.0, 5.0], &[5.0, 4.0, 3.0, 2.0, 1.0]).unwrap();
/// assert_eq!(r.statistic, -1.0);
/// assert_eq!(r.p_value, 0.0);
/// assert!(r.capped);
/// ```
pub fn compute(method: CorrelationMethod, x: &[f64], y: &[f64]) -> Result<CorrelationResult> {
    CorrelationCalculator::default().compute(method, x, y)
}

/// Computes only the correlation coefficient.
///
/// # Errors
/// See [`CorrelationCalculator::compute`].
pub fn correlation_statistic(method: CorrelationMethod, x: &[f64], y: &[f64]) -> Result<f64> {
    validate_pair(x, y)?;
    match method {
        CorrelationMethod::Pearson => pearson_r(x, y),
        CorrelationMethod::Spearman => spearman_rho(x, y),
        CorrelationMethod::Kendall => kendall_counts(x, y).map(|c| c.tau),
    }
}

/// Two-sided p-value of a product-moment (or rank) correlation `r` over
/// `n` pairs, from the t-distribution with `n - 2` degrees of freedom.
///
/// Returns 1.0 for `n < 3` or a non-finite `r`.
#[must_use]
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < MIN_SAMPLES || !r.is_finite() {
        return 1.0;
    }
    let r = r.clamp(-1.0, 1.0);
    let x = ((1.0 - r) * (1.0 + r)).max(0.0);
    if x == 0.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    beta_reg(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Two-sided p-value of Kendall's `tau` over `n` pairs without ties.
///
/// Exact for `n <= KENDALL_EXACT_MAX_N`, normal approximation with
/// variance `2(2n+5) / (9n(n-1))` above that. Returns 1.0 for `n < 3` or a
/// non-finite `tau`.
#[must_use]
pub fn kendall_p_value(tau: f64, n: usize) -> f64 {
    if n < MIN_SAMPLES || !tau.is_finite() {
        return 1.0;
    }
    let tau = tau.clamp(-1.0, 1.0);
    let total_pairs = (n * (n - 1) / 2) as u64;
    if n <= KENDALL_EXACT_MAX_N {
        let discordant = ((1.0 - tau) * total_pairs as f64 / 2.0).round() as u64;
        let discordant = discordant.min(total_pairs);
        return kendall_exact_p(n, discordant.min(total_pairs - discordant));
    }

    let nf = n as f64;
    let variance = 2.0 * (2.0 * nf + 5.0) / (9.0 * nf * (nf - 1.0));
    erfc(tau.abs() / variance.sqrt() / SQRT_2).clamp(0.0, 1.0)
}

/// Calculates ranks for a slice of values, handling ties with average rank.
///
/// Ranks are 1-based.
#[must_use]
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && indexed[j].1 == indexed[i].1 {
            j += 1;
        }

        // Positions i..j share ranks (i+1)..=j
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for item in &indexed[i..j] {
            ranks[item.0] = avg_rank;
        }

        i = j;
    }

    ranks
}

fn validate_pair(x: &[f64], y: &[f64]) -> Result<()> {
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
            "correlation inputs must be finite".to_string(),
        ));
    }
    Ok(())
}

fn ensure_varies(values: &[f64], name: &str) -> Result<()> {
    let first = values[0];
    if values.iter().all(|&v| v == first) {
        return Err(EngineError::DegenerateDistribution(format!(
            "{name} has zero variance"
        )));
    }
    Ok(())
}

fn pearson_r(x: &[f64], y: &[f64]) -> Result<f64> {
    ensure_varies(x, "x")?;
    ensure_varies(y, "y")?;

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(EngineError::DegenerateDistribution(
            "variance product is zero or overflows".to_string(),
        ));
    }

    Ok((covariance / denominator).clamp(-1.0, 1.0))
}

fn spearman_rho(x: &[f64], y: &[f64]) -> Result<f64> {
    ensure_varies(x, "x")?;
    ensure_varies(y, "y")?;
    pearson_r(&rank_average(x), &rank_average(y))
}

/// Tie bookkeeping for one margin of Kendall's tau-b.
#[derive(Debug, Clone, Copy, Default)]
struct TieStats {
    /// Sum of t(t-1)/2 over tie groups.
    pairs: f64,
    /// Sum of t(t-1)(t-2).
    v0: f64,
    /// Sum of t(t-1)(2t+5).
    v1: f64,
}

impl TieStats {
    fn add_group(&mut self, t: usize) {
        if t < 2 {
            return;
        }
        let t = t as f64;
        self.pairs += t * (t - 1.0) / 2.0;
        self.v0 += t * (t - 1.0) * (t - 2.0);
        self.v1 += t * (t - 1.0) * (2.0 * t + 5.0);
    }

    fn from_sorted(sorted: &[f64]) -> Self {
        let mut stats = Self::default();
        let mut i = 0;
        while i < sorted.len() {
            let mut j = i + 1;
            while j < sorted.len() && sorted[j] == sorted[i] {
                j += 1;
            }
            stats.add_group(j - i);
            i = j;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy)]
struct KendallCounts {
    tau: f64,
    con_minus_dis: f64,
    discordant: u64,
    total_pairs: u64,
    x_ties: TieStats,
    y_ties: TieStats,
}

impl KendallCounts {
    fn has_ties(&self) -> bool {
        self.x_ties.pairs > 0.0 || self.y_ties.pairs > 0.0
    }

    fn p_value(&self, n: usize) -> f64 {
        if !self.has_ties() && n <= KENDALL_EXACT_MAX_N {
            let c = self.discordant.min(self.total_pairs - self.discordant);
            return kendall_exact_p(n, c);
        }

        let nf = n as f64;
        let m = nf * (nf - 1.0);
        let (xt, yt) = (self.x_ties, self.y_ties);
        let variance = (m * (2.0 * nf + 5.0) - xt.v1 - yt.v1) / 18.0
            + (2.0 * xt.pairs * yt.pairs) / m
            + xt.v0 * yt.v0 / (9.0 * m * (nf - 2.0));
        if variance <= 0.0 || !variance.is_finite() {
            return 1.0;
        }
        let z = self.con_minus_dis / variance.sqrt();
        erfc(z.abs() / SQRT_2).clamp(0.0, 1.0)
    }
}

fn kendall_counts(x: &[f64], y: &[f64]) -> Result<KendallCounts> {
    ensure_varies(x, "x")?;
    ensure_varies(y, "y")?;

    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| match x[a].total_cmp(&x[b]) {
        Ordering::Equal => y[a].total_cmp(&y[b]),
        other => other,
    });

    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let mut ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    // Pairs tied in both coordinates are adjacent after the lexicographic sort
    let mut joint_pairs = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && xs[j] == xs[i] && ys[j] == ys[i] {
            j += 1;
        }
        let t = (j - i) as f64;
        joint_pairs += t * (t - 1.0) / 2.0;
        i = j;
    }

    let x_ties = TieStats::from_sorted(&xs);
    let discordant = count_inversions(&mut ys);
    // ys is now sorted
    let y_ties = TieStats::from_sorted(&ys);

    let total_pairs = (n * (n - 1) / 2) as u64;
    let tot = total_pairs as f64;
    let con_minus_dis =
        tot - x_ties.pairs - y_ties.pairs + joint_pairs - 2.0 * discordant as f64;
    let denominator = (tot - x_ties.pairs).sqrt() * (tot - y_ties.pairs).sqrt();
    if denominator <= 0.0 {
        return Err(EngineError::DegenerateDistribution(
            "every pair is tied".to_string(),
        ));
    }

    Ok(KendallCounts {
        tau: (con_minus_dis / denominator).clamp(-1.0, 1.0),
        con_minus_dis,
        discordant,
        total_pairs,
        x_ties,
        y_ties,
    })
}

/// Counts pairs `i < j` with `values[i] > values[j]`, sorting `values`.
fn count_inversions(values: &mut [f64]) -> u64 {
    let mut buffer = values.to_vec();
    merge_count(values, &mut buffer)
}

fn merge_count(values: &mut [f64], buffer: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut count = {
        let (left, right) = values.split_at_mut(mid);
        let (buf_left, buf_right) = buffer.split_at_mut(mid);
        merge_count(left, buf_left) + merge_count(right, buf_right)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        if values[j] < values[i] {
            buffer[k] = values[j];
            count += (mid - i) as u64;
            j += 1;
        } else {
            buffer[k] = values[i];
            i += 1;
        }
        k += 1;
    }
    buffer[k..k + (mid - i)].copy_from_slice(&values[i..mid]);
    k += mid - i;
    buffer[k..k + (n - j)].copy_from_slice(&values[j..n]);
    values.copy_from_slice(&buffer[..n]);

    count
}

/// Exact two-sided p-value of Kendall's tau without ties, where `c` is the
/// smaller of the discordant and concordant pair counts.
fn kendall_exact_p(n: usize, c: u64) -> f64 {
    let c = c as usize;
    // counts[k] = permutations of the first i items with k inversions
    let mut counts = vec![0.0_f64; c + 1];
    counts[0] = 1.0;
    for i in 2..=n {
        let mut next = vec![0.0_f64; c + 1];
        let mut window = 0.0;
        for k in 0..=c {
            window += counts[k];
            if k >= i {
                window -= counts[k - i];
            }
            next[k] = window;
        }
        counts = next;
    }

    let factorial: f64 = (1..=n).map(|v| v as f64).product();
    let tail: f64 = counts.iter().sum();
    (2.0 * tail / factorial).min(1.0)
}
