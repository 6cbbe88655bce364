pub mod config;
pub mod config_loader;
pub mod correlation;
pub mod dataset;
pub mod error;
pub mod significance;

pub use config::{EngineConfig, ExecutionMode};
pub use config_loader::ConfigLoader;
pub use correlation::{
    compute, correlation_p_value, correlation_statistic, kendall_p_value, rank_average,
    CorrelationCalculator, CorrelationMethod, CorrelationResult,
};
pub use dataset::{Dataset, EnergyUnit, Sample, MIN_SAMPLES};
pub use error::{EngineError, Result};
pub use significance::{
    sigma_to_p, to_sigma, Significance, SignificanceConverter, DEFAULT_SIGMA_CEILING,
};
