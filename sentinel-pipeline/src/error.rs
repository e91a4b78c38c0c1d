//! Detection error types.
//!
//! Only invalid input is an error. Thin windows and claimed prices below the
//! current price are classification outcomes, and numeric degeneracy is
//! absorbed into neutral metric values.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Non-positive price {price} on {date}")]
    NonPositivePrice { date: NaiveDate, price: f64 },

    #[error("Price history is out of order: {next} follows {previous}")]
    UnorderedHistory {
        previous: NaiveDate,
        next: NaiveDate,
    },

    #[error("Invalid {field}: {value} (must be a finite positive number)")]
    InvalidContextPrice { field: &'static str, value: f64 },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("No price record on or before {0}")]
    NoRecordOnOrBefore(NaiveDate),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Failed to open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;
