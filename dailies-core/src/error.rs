use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Schema migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot mark index {index}: index {previous} is still pending")]
    SequenceViolation { index: u32, previous: u32 },

    #[error("Feature disabled on server {server}: {feature}")]
    FeatureDisabled { server: String, feature: String },
}

pub type Result<T> = std::result::Result<T, TrackerError>;
