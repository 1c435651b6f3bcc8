//! Failure taxonomy for the validation core.
//!
//! Only the inability to ask a question is an error here. Missing data
//! (no snapshot, no cross rate) is modelled as empty results by the callers.

use crate::core::rates::Source;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatesError {
    #[error("storage request for '{target}' failed: {reason}")]
    Storage { target: String, reason: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup of '{key}' failed: {reason}")]
    Lookup { key: String, reason: String },

    #[error("invalid snapshot location: {0}")]
    InvalidLocation(String),

    #[error("snapshot object not found: {0}")]
    MissingObject(String),

    #[error("malformed snapshot object '{key}': {error}")]
    Malformed {
        key: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("snapshot object '{key}' is not valid UTF-8: {error}")]
    Encoding {
        key: String,
        #[source]
        error: std::str::Utf8Error,
    },

    #[error("consensus undefined for {currency} on {date}: group has no contributing rates")]
    ConsensusUndefined { date: NaiveDate, currency: String },

    #[error("{tier} contributed more than one rate for {currency} on {date}")]
    DuplicateObservation {
        tier: Source,
        date: NaiveDate,
        currency: String,
    },
}

impl RatesError {
    pub fn storage(target: impl Into<String>, reason: impl ToString) -> Self {
        RatesError::Storage {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = RatesError> = std::result::Result<T, E>;
