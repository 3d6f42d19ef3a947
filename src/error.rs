use thiserror::Error;

pub type Result<T> = std::result::Result<T, ColocationError>;

#[derive(Error, Debug)]
pub enum ColocationError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Data coverage error: {0}")]
    DataCoverage(String),

    #[error("Temporal resolution error: {0}")]
    TemporalResolution(String),

    #[error("Data extraction error: {0}")]
    DataExtraction(String),

    #[error("Unit mismatch: cannot convert '{from}' to '{to}'")]
    UnitMismatch { from: String, to: String },

    #[error("Invalid spatial filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error(
        "Colocation between model {model_id} / {model_var} and obs {obs_id} / {obs_var} failed: Reason {reason}"
    )]
    JobFailed {
        model_id: String,
        model_var: String,
        obs_id: String,
        obs_var: String,
        reason: String,
    },

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ColocationError {
    /// Short category label used in run-log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ColocationError::Io(_) => "IOError",
            ColocationError::Csv(_) | ColocationError::DateParse(_) => "ParseError",
            ColocationError::Json(_) => "JsonError",
            ColocationError::Parquet(_) | ColocationError::Arrow(_) => "PersistenceError",
            ColocationError::Config(_) | ColocationError::Validation(_) => "ConfigError",
            ColocationError::DataCoverage(_) => "DataCoverageError",
            ColocationError::TemporalResolution(_) => "TemporalResolutionError",
            ColocationError::DataExtraction(_) => "DataExtractionError",
            ColocationError::UnitMismatch { .. } => "UnitMismatchError",
            ColocationError::InvalidFilter(_) => "FilterError",
            ColocationError::InvalidFormat(_) => "FormatError",
            ColocationError::JobFailed { .. } => "JobFailed",
            ColocationError::TaskJoin(_) => "TaskError",
        }
    }

    pub fn is_data_coverage(&self) -> bool {
        matches!(self, ColocationError::DataCoverage(_))
    }
}
