pub mod colocated;
pub mod gridded;
pub mod region;
pub mod station;
pub mod ts_type;
pub mod var_match;

pub use colocated::{
    ColocatedLocation, ColocatedResult, ColocatedStatistics, ColocationMetadata, ObsKind,
    MODEL_ROW, OBS_ROW,
};
pub use gridded::GriddedSeries;
pub use region::Region;
pub use station::{StationCollection, StationMetadata, StationSeries};
pub use ts_type::{lowest_resolution, resolve_resolution, TsType};
pub use var_match::{AuxSpec, VariableMatch};
