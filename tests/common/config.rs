//! Test configuration helpers for creating analyzers in scratch directories

use std::time::Duration;
use tempfile::TempDir;
use cdn_log_dl::{Config, LogAnalyzer};

/// Search term used by the fixtures
pub const NEEDLE: &str = "203.0.113.7";

/// Configuration rooted in `dir`: logs under `dir/logs`, report at
/// `dir/report.txt`, no pacing delay
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.query.domain = "cdn.example.com".to_string();
    config.query.start_time = "2024-05-01T00:00:00Z".to_string();
    config.query.end_time = "2024-05-02T00:00:00Z".to_string();
    config.query.needle = NEEDLE.to_string();
    config.fetch.download_dir = dir.path().join("logs");
    config.fetch.pacing_delay = Duration::ZERO;
    config.fetch.timeout = Duration::from_secs(5);
    config.report.output_path = dir.path().join("report.txt");
    config
}

/// Create an analyzer for [`test_config`] with its scratch directory
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn create_analyzer() -> (LogAnalyzer, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let analyzer = LogAnalyzer::new(test_config(&dir)).expect("test config is valid");
    (analyzer, dir)
}
