//! # cdn-log-dl
//!
//! Downloads CDN access logs and searches them for a substring (typically a
//! client IP), producing a plain-text report of every matching line.
//!
//! ## Pipeline
//!
//! A run takes a list of locators (log file URLs) through two stages, each
//! driven by a [`BoundedExecutor`] with its own concurrency ceiling:
//!
//! 1. **Fetch**: every locator becomes a local artifact. Existing artifacts are
//!    reused without a request.
//! 2. **Scan**: every artifact is streamed line by line (gzip decompressed on
//!    the fly) and lines containing the search term are kept.
//!
//! Item-level failures never stop a stage. They are collected and reported
//! next to whatever succeeded; only a missing locator list, an unusable
//! working directory, or an unwritable report abort the run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cdn_log_dl::{Config, FileLocatorSource, LogAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.query.needle = "203.0.113.7".to_string();
//!
//!     let analyzer = LogAnalyzer::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = analyzer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = analyzer.run(&FileLocatorSource::new("log-url.log")).await?;
//!     println!("{} matching lines", summary.total_lines);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Result aggregation and match sets
pub mod aggregate;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bounded-concurrency executor
pub mod executor;
/// Fetch stage
pub mod fetch;
/// Locator sources
pub mod locators;
/// End-to-end pipeline
pub mod pipeline;
/// Plain-text report
pub mod report;
/// Scan stage
pub mod scan;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use aggregate::{ItemFailure, MatchSet, StageReport, StageSummary};
pub use config::{Config, FetchConfig, QueryConfig, ReportConfig, ScanConfig};
pub use error::{Error, Result};
pub use executor::BoundedExecutor;
pub use fetch::{FetchedArtifact, Fetcher};
pub use locators::{FileLocatorSource, LocatorSource, StaticLocatorSource};
pub use pipeline::{LogAnalyzer, RunSummary};
pub use report::ReportData;
pub use scan::{Compression, Scanner};
pub use types::{Event, Outcome};

/// Fire `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C alone if SIGTERM
///   cannot be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns once the signal arrived and the token was cancelled; spawn it next
/// to the run.
///
/// # Example
///
/// ```no_run
/// use cdn_log_dl::{Config, FileLocatorSource, LogAnalyzer, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.query.needle = "203.0.113.7".to_string();
///     let analyzer = LogAnalyzer::new(config)?;
///
///     tokio::spawn(cancel_on_signal(analyzer.cancel_token()));
///     analyzer.run(&FileLocatorSource::new("log-url.log")).await?;
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::warn!("Cancelling run; in-flight scans stop at their next line");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for Ctrl+C only");
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn signal_listener_returns_when_run_is_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let listener = tokio::spawn(cancel_on_signal(token.clone()));

        token.cancel();

        tokio::time::timeout(Duration::from_secs(2), listener)
            .await
            .expect("listener should stop once the token is cancelled")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn signal_listener_waits_while_no_signal_arrives() {
        let token = CancellationToken::new();
        let listener = tokio::spawn(cancel_on_signal(token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!listener.is_finished());
        assert!(!token.is_cancelled());

        listener.abort();
    }
}
