//! Configuration types for cdn-log-dl
//!
//! Every tunable the pipeline uses lives here with a documented default. A
//! [`Config`] is built once (defaults, then an optional JSON file, then CLI
//! overrides), validated, and passed by reference into each stage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Query parameters describing what is being searched for
///
/// `domain` and the time range are carried through to the report header; the
/// `needle` is the plain substring every scanned line is tested against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// CDN domain the logs belong to
    #[serde(default)]
    pub domain: String,

    /// Start of the log time range (RFC 3339, e.g. "2024-05-01T00:00:00Z")
    #[serde(default)]
    pub start_time: String,

    /// End of the log time range (RFC 3339)
    #[serde(default)]
    pub end_time: String,

    /// Substring to search for in every log line
    #[serde(default)]
    pub needle: String,
}

/// Fetch stage configuration (destination, concurrency, HTTP behavior)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Directory fetched artifacts are written to (default: "logs")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent fetches (default: 8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Total timeout for a single fetch, including the body (default: 60s)
    #[serde(default = "default_fetch_timeout")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Delay applied after every network fetch attempt, success or failure (default: 1s)
    ///
    /// The delay is taken while the fetch still holds its concurrency permit, so it
    /// caps the request rate at roughly `concurrency / pacing_delay`.
    #[serde(default = "default_pacing_delay")]
    pub pacing_delay: Duration,

    /// Keep the `.part` file of a failed fetch on disk (default: false)
    ///
    /// A kept `.part` file is never mistaken for a finished artifact.
    #[serde(default)]
    pub keep_partial: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            concurrency: default_concurrency(),
            timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            pacing_delay: default_pacing_delay(),
            keep_partial: false,
        }
    }
}

/// Scan stage configuration (concurrency and line buffer bounds)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum concurrent scans (default: 8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Initial capacity of the line buffer in bytes (default: 1 MiB)
    #[serde(default = "default_initial_line_bytes")]
    pub initial_line_bytes: usize,

    /// Hard ceiling for a single line in bytes (default: 10 MiB)
    ///
    /// A line longer than this fails the scan of its artifact.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            initial_line_bytes: default_initial_line_bytes(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Report sink configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Path of the plain-text report (default: "ip_search_results.txt")
    #[serde(default = "default_report_path")]
    pub output_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: default_report_path(),
        }
    }
}

/// Main configuration for [`LogAnalyzer`](crate::LogAnalyzer)
///
/// Fields are organized into sub-configs, one per stage:
/// - [`query`](QueryConfig): domain, time range, needle
/// - [`fetch`](FetchConfig): download directory, HTTP timeout, pacing
/// - [`scan`](ScanConfig): scan concurrency, line buffer bounds
/// - [`report`](ReportConfig): report output path
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// What is being searched for
    #[serde(default)]
    pub query: QueryConfig,

    /// Fetch stage settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Scan stage settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults, so a file only needs the settings it
    /// changes. The result is not validated; call [`Config::validate`] after
    /// applying any overrides.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("invalid config file '{}': {}", path.display(), e),
            key: None,
        })
    }

    /// Check that every setting is usable
    ///
    /// A configuration error is fatal: the run aborts before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.query.needle.is_empty() {
            return Err(Error::config("query.needle", "search term must not be empty"));
        }

        let start = parse_time("query.start_time", &self.query.start_time)?;
        let end = parse_time("query.end_time", &self.query.end_time)?;
        if let (Some(start), Some(end)) = (start, end)
            && start >= end
        {
            return Err(Error::config(
                "query.end_time",
                format!(
                    "end time {} must be after start time {}",
                    self.query.end_time, self.query.start_time
                ),
            ));
        }

        if self.fetch.concurrency == 0 {
            return Err(Error::config("fetch.concurrency", "must be at least 1"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(Error::config("fetch.timeout", "must be greater than zero"));
        }
        if self.scan.concurrency == 0 {
            return Err(Error::config("scan.concurrency", "must be at least 1"));
        }
        if self.scan.initial_line_bytes == 0 {
            return Err(Error::config(
                "scan.initial_line_bytes",
                "must be greater than zero",
            ));
        }
        if self.scan.initial_line_bytes > self.scan.max_line_bytes {
            return Err(Error::config(
                "scan.max_line_bytes",
                format!(
                    "must be at least initial_line_bytes ({})",
                    self.scan.initial_line_bytes
                ),
            ));
        }

        Ok(())
    }
}

/// Parse an optional RFC 3339 timestamp; empty means "not given"
fn parse_time(key: &str, value: &str) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>> {
    if value.is_empty() {
        return Ok(None);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(Some)
        .map_err(|e| {
            Error::config(
                key,
                format!("'{value}' is not an RFC 3339 timestamp (e.g. 2024-05-01T00:00:00Z): {e}"),
            )
        })
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_concurrency() -> usize {
    8
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string()
}

fn default_pacing_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_initial_line_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_line_bytes() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

fn default_report_path() -> PathBuf {
    PathBuf::from("ip_search_results.txt")
}
