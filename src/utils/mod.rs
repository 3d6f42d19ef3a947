pub mod constants;
pub mod coordinates;
pub mod filename;
pub mod pattern;
pub mod progress;

pub use constants::*;
pub use coordinates::{dms_to_decimal, normalize_longitude, parse_coordinate};
pub use filename::{run_log_path, to_datestring_yyyymmdd, SavenameKey};
pub use pattern::{matches_any, matches_pattern};
pub use progress::ProgressReporter;
