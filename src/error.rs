//! Error types for cdn-log-dl
//!
//! Errors fall into three tiers:
//! - item-level failures (one locator failed to fetch, one artifact failed to scan),
//!   which are recorded in an [`Outcome`](crate::types::Outcome) and never abort a batch
//! - batch-level partial failures ([`Error::PartialFailure`]), the composite
//!   produced when a stage finished with one or more item-level failures
//! - fatal failures (configuration, locator source, working directories, report sink),
//!   which abort the run before a report is produced

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cdn-log-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cdn-log-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.concurrency")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level network error (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote source answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The locator that was requested
        url: String,
        /// The status code returned by the remote source
        status: u16,
    },

    /// A single line exceeded the configured line buffer ceiling
    #[error("line in {} exceeds the {limit} byte line limit", .path.display())]
    LineTooLong {
        /// The artifact being scanned
        path: PathBuf,
        /// The configured maximum line size in bytes
        limit: usize,
    },

    /// Compressed stream could not be decoded
    #[error("failed to decompress {}: {reason}", .path.display())]
    Decompress {
        /// The artifact being scanned
        path: PathBuf,
        /// The decoder's error message
        reason: String,
    },

    /// Work was abandoned because the shared cancellation signal fired
    #[error("cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted before producing a value
    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    /// A required working directory could not be created
    #[error("cannot prepare directory {}: {reason}", .path.display())]
    WorkingDirectory {
        /// The directory that could not be created
        path: PathBuf,
        /// The underlying I/O error message
        reason: String,
    },

    /// The locator list could not be obtained
    #[error("locator source error: {0}")]
    LocatorSource(String),

    /// The report could not be written
    #[error("report error: {0}")]
    Report(String),

    /// A stage finished with item-level failures alongside its successes
    #[error("{stage}: {failed} of {attempted} items failed: {}", .details.join("; "))]
    PartialFailure {
        /// The stage that produced the failures ("fetch" or "scan")
        stage: &'static str,
        /// Number of failed items
        failed: usize,
        /// Number of items attempted
        attempted: usize,
        /// One description per failed item
        details: Vec<String>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error aborts the whole run
    ///
    /// Item-level errors and partial failures are never fatal; they are collected
    /// and surfaced alongside whatever succeeded.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config { .. } => true,
            Error::WorkingDirectory { .. } => true,
            Error::LocatorSource(_) => true,
            Error::Report(_) => true,
            Error::Io(_) => false,
            Error::Network(_) => false,
            Error::HttpStatus { .. } => false,
            Error::LineTooLong { .. } => false,
            Error::Decompress { .. } => false,
            Error::Cancelled => false,
            Error::WorkerPanicked(_) => false,
            Error::PartialFailure { .. } => false,
            Error::Other(_) => false,
        }
    }

    /// Whether this is a batch-level partial failure
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::PartialFailure { .. })
    }

    /// Whether this error was caused by the shared cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Machine-readable error code, used in log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(e) if e.is_timeout() => "timeout",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::LineTooLong { .. } => "line_too_long",
            Error::Decompress { .. } => "decompress_error",
            Error::Cancelled => "cancelled",
            Error::WorkerPanicked(_) => "worker_panicked",
            Error::WorkingDirectory { .. } => "working_directory_error",
            Error::LocatorSource(_) => "locator_source_error",
            Error::Report(_) => "report_error",
            Error::PartialFailure { .. } => "partial_failure",
            Error::Other(_) => "internal_error",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, bool, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("fetch.concurrency".into()),
                },
                true,
                "config_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                false,
                "io_error",
            ),
            (
                Error::HttpStatus {
                    url: "https://cdn.example.com/a.gz".into(),
                    status: 404,
                },
                false,
                "http_status",
            ),
            (
                Error::LineTooLong {
                    path: PathBuf::from("a.log"),
                    limit: 16,
                },
                false,
                "line_too_long",
            ),
            (
                Error::Decompress {
                    path: PathBuf::from("a.gz"),
                    reason: "invalid gzip header".into(),
                },
                false,
                "decompress_error",
            ),
            (Error::Cancelled, false, "cancelled"),
            (Error::Other("unknown".into()), false, "internal_error"),
            (
                Error::WorkerPanicked("boom".into()),
                false,
                "worker_panicked",
            ),
            (
                Error::LocatorSource("missing file".into()),
                true,
                "locator_source_error",
            ),
            (Error::Report("disk full".into()), true, "report_error"),
            (
                Error::WorkingDirectory {
                    path: PathBuf::from("/readonly/logs"),
                    reason: "permission denied".into(),
                },
                true,
                "working_directory_error",
            ),
            (
                Error::PartialFailure {
                    stage: "scan",
                    failed: 1,
                    attempted: 3,
                    details: vec!["a.gz: cancelled".into()],
                },
                false,
                "partial_failure",
            ),
        ]
    }

    #[test]
    fn every_variant_has_expected_fatality_and_code() {
        for (error, fatal, code) in all_error_variants() {
            assert_eq!(error.is_fatal(), fatal, "fatality mismatch for {error:?}");
            assert_eq!(error.error_code(), code, "code mismatch for {error:?}");
        }
    }

    #[test]
    fn partial_failure_message_lists_every_failure() {
        let error = Error::PartialFailure {
            stage: "fetch",
            failed: 2,
            attempted: 5,
            details: vec![
                "https://a/x.gz: HTTP 404".into(),
                "https://a/y.gz: timeout".into(),
            ],
        };

        let message = error.to_string();
        assert!(message.starts_with("fetch: 2 of 5 items failed"));
        assert!(message.contains("x.gz"), "first failure missing: {message}");
        assert!(message.contains("y.gz"), "second failure missing: {message}");
        assert!(error.is_partial());
    }

    #[test]
    fn config_shorthand_records_key() {
        match Error::config("scan.max_line_bytes", "must be positive") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be positive");
                assert_eq!(key.as_deref(), Some("scan.max_line_bytes"));
            }
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
