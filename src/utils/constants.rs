/// Output file extension for colocated data
pub const COLOCATED_FILE_EXTENSION: &str = "parquet";

/// Schema metadata key holding colocation provenance (JSON)
pub const COLOCATION_METADATA_KEY: &str = "colocation_metadata";

/// Directory names
pub const LOGFILES_DIR: &str = "logfiles";

/// File names used by the CSV readers
pub const STATIONS_FILE: &str = "stations.csv";
pub const VARIABLES_FILE: &str = "variables.csv";

/// Spatial filter defaults
pub const DEFAULT_FILTER_NAME: &str = "WORLD-wMOUNTAINS";
pub const FILTER_NO_MOUNTAINS_SUFFIX: &str = "-noMOUNTAINS";
pub const FILTER_WITH_MOUNTAINS_SUFFIX: &str = "-wMOUNTAINS";
pub const MOUNTAIN_ALTITUDE_THRESHOLD: f64 = 1000.0;

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
/// Interpolation above this many (station x timestamp) points runs per station
pub const DEFAULT_MAX_BULK_POINTS: usize = 5_000_000;

/// Run log markers
pub const RUN_LOG_SEPARATOR: &str = "------------------ NEW ----------------";

/// Default valid ranges (low, high) applied by outlier removal
pub const DEFAULT_OUTLIER_RANGES: &[(&str, f64, f64)] = &[
    ("od550aer", -1.0, 10.0),
    ("od550lt1aer", -1.0, 10.0),
    ("od550gt1aer", -1.0, 10.0),
    ("abs550aer", -1.0, 10.0),
    ("ang4487aer", -4.0, 4.0),
    ("scatc550dryaer", -10.0, 1000.0),
    ("absc550aer", -10.0, 1000.0),
    ("ec550dryaer", -10.0, 1000.0),
    ("abs5503Daer", -10.0, 1000.0),
    ("concpm10", 0.0, 5000.0),
    ("concpm25", 0.0, 5000.0),
    ("conco3", 0.0, 1000.0),
];

/// Aliases whose outlier ranges are shared with a canonical variable name
pub const VARIABLE_ALIASES: &[(&str, &str)] = &[
    ("od550csaer", "od550aer"),
    ("scatc550aer", "scatc550dryaer"),
    ("absc550dryaer", "absc550aer"),
];

/// Compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
