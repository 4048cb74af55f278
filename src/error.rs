
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopoloError {
    #[error("Malformed date '{input}': {reason}")]
    MalformedDate { input: String, reason: String },
    #[error("Invalid interval: start {start} is after end {end}")]
    InvalidInterval { start: String, end: String },
    #[error("Invalid {kind} record: missing {field}")]
    InvalidRecord { kind: &'static str, field: &'static str },
    #[error("{kind} record {record} overlaps existing interval ({candidate} : {existing})")]
    OverlappingInterval {
        kind: &'static str,
        record: u64,
        existing: String,
        candidate: String,
    },
    #[error("{0} is not a percentage")]
    InvalidPercentage(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, PopoloError>;

// Helper conversions
impl From<rusqlite::Error> for PopoloError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for PopoloError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}
impl From<config::ConfigError> for PopoloError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for PopoloError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
