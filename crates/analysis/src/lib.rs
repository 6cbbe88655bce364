//! Analyses built on the correlation core: robust lag regression,
//! partition scanning with look-elsewhere correction, and combination of
//! independent sources with multiple-testing control.

pub mod combiner;
pub mod partition;
pub mod quantile;
pub mod regression;
pub mod scanner;

pub use combiner::{
    benjamini_hochberg, bonferroni, CombinedResult, CombinerConfig, CorrectionMethod,
    FdrCorrection, MultiSourceCombiner, SourceFailure,
};
pub use partition::{
    standard_search, Axis, Bound, Criterion, EnergyPercentileBins, EnergyTimeGrid, Partition,
    PartitionGenerator, SlidingTimeWindows, StandardSearch, TimeQuantileBins,
};
pub use regression::{ordinary_fit, RegressionConfig, RegressionResult, RobustRegressor};
pub use scanner::{
    sidak_global_p, BestSubset, PartitionFailure, ScanConfig, ScanReport, SkippedPartition,
    SubsetResult, SubsetScanner,
};
