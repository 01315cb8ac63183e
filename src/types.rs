//! Core types for cdn-log-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of applying one unit of work to one work item
///
/// Exactly one outcome is produced per item; the item travels with both
/// variants so callers can re-correlate outcomes that complete out of order.
#[derive(Debug)]
pub enum Outcome<I, T> {
    /// The worker produced a value
    Success {
        /// The work item this outcome belongs to
        item: I,
        /// The worker's value
        value: T,
    },
    /// The worker failed, panicked, or was cancelled
    Failure {
        /// The work item this outcome belongs to
        item: I,
        /// What went wrong
        error: Error,
    },
}

impl<I, T> Outcome<I, T> {
    /// Build an outcome from a worker's result
    pub fn from_result(item: I, result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success { item, value },
            Err(error) => Outcome::Failure { item, error },
        }
    }

    /// The work item this outcome belongs to
    pub fn item(&self) -> &I {
        match self {
            Outcome::Success { item, .. } | Outcome::Failure { item, .. } => item,
        }
    }

    /// Whether the worker succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// The error, if the worker failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }

    /// Split into the item and a plain `Result`
    pub fn into_parts(self) -> (I, Result<T>) {
        match self {
            Outcome::Success { item, value } => (item, Ok(value)),
            Outcome::Failure { item, error } => (item, Err(error)),
        }
    }
}

/// Progress events emitted by [`LogAnalyzer`](crate::LogAnalyzer)
///
/// Subscribers receive events via `LogAnalyzer::subscribe()`. Events are
/// informational; nothing in the pipeline waits on a subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The locator source returned its list
    LocatorsLoaded {
        /// Number of locators to fetch
        count: usize,
    },

    /// The artifact already existed, so no request was made
    FetchSkipped {
        /// Locator that was not re-fetched
        locator: String,
        /// Existing artifact path
        artifact: PathBuf,
    },

    /// A locator was fetched into a new artifact
    FetchCompleted {
        /// Locator that was fetched
        locator: String,
        /// Artifact path written
        artifact: PathBuf,
        /// Body size in bytes
        bytes: u64,
    },

    /// A locator could not be fetched
    FetchFailed {
        /// Locator that failed
        locator: String,
        /// Error description
        error: String,
    },

    /// An artifact was scanned to the end
    ScanCompleted {
        /// Artifact path
        artifact: PathBuf,
        /// Number of matching lines
        matches: usize,
    },

    /// An artifact could not be scanned to the end
    ScanFailed {
        /// Artifact path
        artifact: PathBuf,
        /// Error description
        error: String,
    },

    /// The report was written
    ReportWritten {
        /// Report path
        path: PathBuf,
        /// Number of artifacts with at least one match
        files_matched: usize,
        /// Total number of matching lines
        total_lines: usize,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_result_keeps_item_on_both_variants() {
        let ok: Outcome<&str, usize> = Outcome::from_result("a.gz", Ok(3));
        let err: Outcome<&str, usize> = Outcome::from_result("b.gz", Err(Error::Cancelled));

        assert_eq!(*ok.item(), "a.gz");
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        assert_eq!(*err.item(), "b.gz");
        assert!(!err.is_success());
        assert!(err.error().is_some_and(Error::is_cancelled));
    }

    #[test]
    fn outcome_into_parts_returns_value_or_error() {
        let (item, result) = Outcome::<_, Vec<String>>::from_result(
            "c.log".to_string(),
            Ok(vec!["line".to_string()]),
        )
        .into_parts();

        assert_eq!(item, "c.log");
        assert_eq!(result.expect("success"), vec!["line".to_string()]);
    }

    #[test]
    fn event_serializes_with_snake_case_tag() {
        let event = Event::ScanCompleted {
            artifact: PathBuf::from("logs/a.gz"),
            matches: 2,
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "scan_completed");
        assert_eq!(json["matches"], 2);
    }
}
