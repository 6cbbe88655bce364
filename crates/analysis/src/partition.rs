//! Data partitions and the generators that enumerate them.
//!
//! A [`Partition`] is a conjunction of [`Criterion`]s. Every relative
//! bound (percentile, quantile bin, median) is resolved against the full
//! dataset column, not against the samples left by other criteria, so a
//! partition means the same thing regardless of criterion order.

use lagscan_core::{Dataset, EngineError, Result, Sample};
use serde::{Deserialize, Serialize};

use crate::quantile::{quantile_sorted, sorted};

/// Column a criterion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Energy,
    Time,
}

impl Axis {
    fn value(self, sample: &Sample) -> f64 {
        match self {
            Self::Energy => sample.energy,
            Self::Time => sample.time,
        }
    }

    fn column(self, dataset: &Dataset) -> Vec<f64> {
        match self {
            Self::Energy => dataset.energies(),
            Self::Time => dataset.times(),
        }
    }
}

/// Range selected on one axis.
///
/// Lower bounds are inclusive and upper bounds exclusive, except where a
/// bound reaches the top of the column, which is inclusive so the maximum
/// value is never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bound {
    /// Between two percentiles (0 to 100) of the column.
    Percentile { low: f64, high: f64 },
    /// Between two absolute values in the dataset's units.
    Absolute { min: f64, max: f64 },
    /// Bin `index` of `count` equal-population bins.
    QuantileBin { index: usize, count: usize },
    /// Strictly above the column median.
    AboveMedian,
    /// At or below the column median.
    BelowMedian,
}

/// A bound on one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub axis: Axis,
    pub bound: Bound,
}

impl Criterion {
    #[must_use]
    pub fn new(axis: Axis, bound: Bound) -> Self {
        Self { axis, bound }
    }

    fn resolve(&self, dataset: &Dataset) -> Result<Interval> {
        let column = sorted(&self.axis.column(dataset));
        let top = column.last().copied().unwrap_or(f64::INFINITY);

        let interval = match self.bound {
            Bound::Percentile { low, high } => {
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
                    return Err(EngineError::InvalidInput(format!(
                        "percentile bounds must satisfy 0 <= low < high <= 100, got {low}..{high}"
                    )));
                }
                Interval::half_open(
                    quantile_sorted(&column, low / 100.0),
                    quantile_sorted(&column, high / 100.0),
                    high >= 100.0,
                )
            }
            Bound::QuantileBin { index, count } => {
                if count == 0 || index >= count {
                    return Err(EngineError::InvalidInput(format!(
                        "quantile bin {index} of {count} does not exist"
                    )));
                }
                Interval::half_open(
                    quantile_sorted(&column, index as f64 / count as f64),
                    quantile_sorted(&column, (index + 1) as f64 / count as f64),
                    index + 1 == count,
                )
            }
            Bound::Absolute { min, max } => {
                if !min.is_finite() || !max.is_finite() || min >= max {
                    return Err(EngineError::InvalidInput(format!(
                        "absolute bounds must be finite with min < max, got {min}..{max}"
                    )));
                }
                Interval::half_open(min, max, max >= top)
            }
            Bound::AboveMedian => Interval {
                lower: quantile_sorted(&column, 0.5),
                lower_inclusive: false,
                upper: f64::INFINITY,
                upper_inclusive: true,
            },
            Bound::BelowMedian => Interval {
                lower: f64::NEG_INFINITY,
                lower_inclusive: true,
                upper: quantile_sorted(&column, 0.5),
                upper_inclusive: true,
            },
        };

        Ok(interval)
    }
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    lower: f64,
    lower_inclusive: bool,
    upper: f64,
    upper_inclusive: bool,
}

impl Interval {
    fn half_open(lower: f64, upper: f64, upper_inclusive: bool) -> Self {
        Self {
            lower,
            lower_inclusive: true,
            upper,
            upper_inclusive,
        }
    }

    fn contains(&self, value: f64) -> bool {
        let above = if self.lower_inclusive {
            value >= self.lower
        } else {
            value > self.lower
        };
        let below = if self.upper_inclusive {
            value <= self.upper
        } else {
            value < self.upper
        };
        above && below
    }
}

/// A labelled subset of a dataset: the samples meeting every criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub label: String,
    pub criteria: Vec<Criterion>,
}

impl Partition {
    #[must_use]
    pub fn new(label: impl Into<String>, criteria: Vec<Criterion>) -> Self {
        Self {
            label: label.into(),
            criteria,
        }
    }

    /// The whole dataset.
    #[must_use]
    pub fn all(label: impl Into<String>) -> Self {
        Self::new(label, Vec::new())
    }

    /// A partition with a single criterion.
    #[must_use]
    pub fn single(label: impl Into<String>, axis: Axis, bound: Bound) -> Self {
        Self::new(label, vec![Criterion::new(axis, bound)])
    }

    /// Adds a criterion to the conjunction.
    #[must_use]
    pub fn and(mut self, axis: Axis, bound: Bound) -> Self {
        self.criteria.push(Criterion::new(axis, bound));
        self
    }

    /// Returns the `(energies, times)` of the samples in this partition.
    ///
    /// # Errors
    /// Returns `InvalidInput` if a bound is malformed.
    pub fn select(&self, dataset: &Dataset) -> Result<(Vec<f64>, Vec<f64>)> {
        let resolved = self
            .criteria
            .iter()
            .map(|c| c.resolve(dataset).map(|interval| (c.axis, interval)))
            .collect::<Result<Vec<_>>>()?;

        Ok(dataset.filter(|sample| {
            resolved
                .iter()
                .all(|(axis, interval)| interval.contains(axis.value(sample)))
        }))
    }
}

/// Enumerates partitions for a dataset.
pub trait PartitionGenerator {
    /// Partitions to scan, in evaluation order.
    fn partitions(&self, dataset: &Dataset) -> Vec<Partition>;
}

impl PartitionGenerator for Vec<Partition> {
    fn partitions(&self, _dataset: &Dataset) -> Vec<Partition> {
        self.clone()
    }
}

impl PartitionGenerator for [Partition] {
    fn partitions(&self, _dataset: &Dataset) -> Vec<Partition> {
        self.to_vec()
    }
}

/// Equal-population energy bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyPercentileBins {
    pub bins: usize,
}

impl Default for EnergyPercentileBins {
    fn default() -> Self {
        Self { bins: 10 }
    }
}

impl PartitionGenerator for EnergyPercentileBins {
    fn partitions(&self, _dataset: &Dataset) -> Vec<Partition> {
        quantile_bins(Axis::Energy, self.bins)
    }
}

/// Equal-population time bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeQuantileBins {
    pub bins: usize,
}

impl Default for TimeQuantileBins {
    fn default() -> Self {
        Self { bins: 5 }
    }
}

impl PartitionGenerator for TimeQuantileBins {
    fn partitions(&self, _dataset: &Dataset) -> Vec<Partition> {
        quantile_bins(Axis::Time, self.bins)
    }
}

fn quantile_bins(axis: Axis, bins: usize) -> Vec<Partition> {
    let name = match axis {
        Axis::Energy => "energy",
        Axis::Time => "time",
    };
    (0..bins)
        .map(|index| {
            Partition::single(
                format!("{name}_bin_{}_of_{bins}", index + 1),
                axis,
                Bound::QuantileBin {
                    index,
                    count: bins,
                },
            )
        })
        .collect()
}

/// Overlapping time windows spanning a fraction of the observed time range.
///
/// Window `k` starts at `t_min + k * width / 4`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlidingTimeWindows {
    /// Window width as a fraction of `t_max - t_min`.
    pub window_fraction: f64,
    /// Number of windows.
    pub positions: usize,
}

impl Default for SlidingTimeWindows {
    fn default() -> Self {
        Self {
            window_fraction: 1.0 / 3.0,
            positions: 5,
        }
    }
}

impl PartitionGenerator for SlidingTimeWindows {
    fn partitions(&self, dataset: &Dataset) -> Vec<Partition> {
        let times = dataset.times();
        let t_min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let t_max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let width = (t_max - t_min) * self.window_fraction;
        if !(width > 0.0) {
            return Vec::new();
        }
        let step = width / 4.0;

        (0..self.positions)
            .map(|k| {
                let start = t_min + k as f64 * step;
                Partition::single(
                    format!("time_window_{}", k + 1),
                    Axis::Time,
                    Bound::Absolute {
                        min: start,
                        max: start + width,
                    },
                )
            })
            .collect()
    }
}

/// Every combination of energy and time quantile bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyTimeGrid {
    pub energy_bins: usize,
    pub time_bins: usize,
}

impl Default for EnergyTimeGrid {
    fn default() -> Self {
        Self {
            energy_bins: 3,
            time_bins: 3,
        }
    }
}

impl PartitionGenerator for EnergyTimeGrid {
    fn partitions(&self, _dataset: &Dataset) -> Vec<Partition> {
        let mut partitions = Vec::with_capacity(self.energy_bins * self.time_bins);
        for e in 0..self.energy_bins {
            for t in 0..self.time_bins {
                partitions.push(
                    Partition::single(
                        format!(
                            "energy_bin_{}_of_{}_x_time_bin_{}_of_{}",
                            e + 1,
                            self.energy_bins,
                            t + 1,
                            self.time_bins
                        ),
                        Axis::Energy,
                        Bound::QuantileBin {
                            index: e,
                            count: self.energy_bins,
                        },
                    )
                    .and(
                        Axis::Time,
                        Bound::QuantileBin {
                            index: t,
                            count: self.time_bins,
                        },
                    ),
                );
            }
        }
        partitions
    }
}

/// The usual hidden-signal search: energy deciles, time quintiles, five
/// sliding time windows, late photons at high energy, and the dataset
/// without its most energetic 5%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardSearch {
    pub energy: EnergyPercentileBins,
    pub time: TimeQuantileBins,
    pub windows: SlidingTimeWindows,
}

/// The default [`StandardSearch`].
#[must_use]
pub fn standard_search() -> StandardSearch {
    StandardSearch::default()
}

impl PartitionGenerator for StandardSearch {
    fn partitions(&self, dataset: &Dataset) -> Vec<Partition> {
        let mut partitions = self.energy.partitions(dataset);
        partitions.extend(self.time.partitions(dataset));
        partitions.extend(self.windows.partitions(dataset));
        partitions.push(
            Partition::single("late_time_high_energy", Axis::Time, Bound::AboveMedian).and(
                Axis::Energy,
                Bound::Percentile {
                    low: 75.0,
                    high: 100.0,
                },
            ),
        );
        partitions.push(Partition::single(
            "without_top_5pct_energy",
            Axis::Energy,
            Bound::Percentile {
                low: 0.0,
                high: 95.0,
            },
        ));
        partitions
    }
}
