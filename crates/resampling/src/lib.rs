//! Permutation and bootstrap null distributions for paired statistics.
//!
//! Every run takes an explicit seed; trial `i` uses its own ChaCha stream,
//! so sequential and parallel execution give identical results.

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod permutation;
pub mod summary;

pub use bootstrap::count_sign_reversals;
pub use config::{ResamplingConfig, DEFAULT_CHUNK_SIZE};
pub use engine::{trial_rng, ResamplingEngine, ResamplingMethod, ResamplingResult};
pub use permutation::{count_exceedances, empirical_p_value};
pub use summary::{percentile_ci, NullDistributionSummary};
