use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("malformed rating report: {0}")]
    MalformedReport(String),

    #[error("ledger consistency failure: {0}")]
    LedgerConsistency(String),

    #[error("insufficient history: {points} usable point(s), at least 2 required")]
    InsufficientHistory { points: usize },

    #[error("no netback effective on or before {reference_date}")]
    MissingNetback { reference_date: NaiveDate },

    #[error("invalid netback effective {effective_date}: {reason}")]
    InvalidNetback {
        effective_date: NaiveDate,
        reason: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{job} job did not complete within {timeout_secs}s")]
    JobTimeout { job: String, timeout_secs: u64 },

    #[error("worker pool unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
