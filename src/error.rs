//! Error taxonomy for history reconstruction and incident statistics.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HistoryError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// No bundle is stored for the day. Drives the gap-tolerance counter.
    #[error("no bundle stored for {day}")]
    NotFound { day: NaiveDate },

    /// Listing, fetching or any other storage round-trip failed.
    #[error("storage failure while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A compressed stream, JSON payload or CSV column could not be decoded.
    #[error("failed to decode {context}: {reason}")]
    Decode { context: String, reason: String },

    /// The walk stopped short of the cutoff somewhere other than the start
    /// of daily bundle retention.
    #[error(
        "gap in station status history after {}, a gap-tolerant reconstruction is required",
        display_day(.last_day_with_data)
    )]
    UnrecoverableGap { last_day_with_data: Option<NaiveDate> },

    #[error("unknown status category '{0}'")]
    UnknownCategory(String),

    #[error("failed to write statistics while {context}: {source}")]
    Sink {
        context: String,
        #[source]
        source: BoxError,
    },
}

fn display_day(day: &Option<NaiveDate>) -> String {
    match day {
        Some(day) => day.to_string(),
        None => "<no data>".to_string(),
    }
}

impl HistoryError {
    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        HistoryError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        HistoryError::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        HistoryError::Sink {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::NotFound { .. })
    }
}
