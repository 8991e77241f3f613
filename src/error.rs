use thiserror::Error;

pub type ChurnframeResult<T> = Result<T, ChurnframeError>;

#[derive(Debug, Error)]
pub enum ChurnframeError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised by input validation and frame transformations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(
        "Found {count} lifecycle record(s) with a churn date earlier than the became-customer date (e.g. customer '{example}')"
    )]
    ChurnBeforeBecame { count: usize, example: String },

    #[error("Duplicate customer id(s) in the lifecycle table: {0}")]
    DuplicateCustomerIds(String),

    #[error("Missing required column '{column}': {msg}")]
    MissingColumn { column: String, msg: String },

    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error("Failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),
}

/// Errors raised while validating the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Term length must be at least one period")]
    ZeroTermLength,

    #[error("Unsupported period unit '{unit}': {msg}")]
    UnsupportedPeriodUnit { unit: String, msg: String },

    #[error("Cohort filter column '{0}' is not present in the lifecycle table")]
    UnknownFilterColumn(String),

    #[error("Cannot resolve term length: {0}")]
    UnresolvableTermLength(String),

    #[error("Invalid rolling window: {0}")]
    InvalidRollingWindow(String),
}

/// Errors related to writing the output table.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),
}

/// Errors related to internal invariants and bugs.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("System error: {0}")]
    Generic(String),

    #[error("Missing internal field: {0}")]
    MissingField(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
