pub mod aligner;
pub mod cache_gate;
pub mod gridded_aligner;
pub mod interpolation;
pub mod outliers;
pub mod regrid;
pub mod resampler;
pub mod run_log;
pub mod runner;
pub mod station_aligner;
pub mod units;
pub mod var_matcher;

pub use aligner::{AlignOptions, JobKey, TimeAlignment};
pub use cache_gate::{CacheDecision, CacheGate};
pub use gridded_aligner::GriddedAligner;
pub use interpolation::Interpolation;
pub use outliers::{OutlierFilter, ValueRange};
pub use run_log::{LogKind, RunLog};
pub use runner::{ColocationRunner, JobReport, JobState, RunOutcome};
pub use station_aligner::StationAligner;
pub use units::UnitConversion;
pub use var_matcher::{MatchSet, VariableMatcher};
