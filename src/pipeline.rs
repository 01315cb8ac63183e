//! End-to-end run: locators → fetch stage → scan stage → aggregation → report.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{ItemFailure, MatchSet, StageReport, StageSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::BoundedExecutor;
use crate::fetch::{FetchedArtifact, Fetcher};
use crate::locators::LocatorSource;
use crate::report::ReportData;
use crate::scan::Scanner;
use crate::types::Event;

/// What a finished run produced
///
/// Item-level failures live here rather than in the `Err` path of
/// [`LogAnalyzer::run`]; a run that returns `Ok` wrote its report.
#[derive(Debug)]
pub struct RunSummary {
    /// Fetch stage counts
    pub fetch: StageSummary,
    /// Scan stage counts
    pub scan: StageSummary,
    /// Locators that could not be fetched
    pub fetch_failures: Vec<ItemFailure<String>>,
    /// Artifacts that could not be scanned to the end
    pub scan_failures: Vec<ItemFailure<PathBuf>>,
    /// One composite error per stage that had failures
    pub partial_failures: Vec<Error>,
    /// Distinct artifacts handed to the scan stage
    pub artifacts: Vec<PathBuf>,
    /// Where the report was written
    pub report_path: PathBuf,
    /// Artifacts with at least one matching line
    pub files_matched: usize,
    /// Matching lines across all artifacts
    pub total_lines: usize,
    /// Whether the cancellation signal fired during the run
    pub cancelled: bool,
}

impl RunSummary {
    /// True when neither stage had a failure
    pub fn is_complete(&self) -> bool {
        self.fetch.failed == 0 && self.scan.failed == 0
    }
}

/// Downloads CDN log files and searches them for a substring
///
/// Cheap to clone; clones share the event channel and cancellation signal.
#[derive(Clone)]
pub struct LogAnalyzer {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    cancel_token: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl LogAnalyzer {
    /// Create an analyzer from a configuration
    ///
    /// The configuration is validated here; an invalid configuration is fatal.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(&config.fetch)?;

        // Buffer of 1000 events; slow subscribers lag rather than block the run
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            cancel_token: CancellationToken::new(),
            event_tx,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this analyzer runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle to the shared cancellation signal
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Fire the cancellation signal
    ///
    /// Fetches that have not started fail with [`Error::Cancelled`]; in-flight
    /// scans stop at their next line. The run still writes a report for what
    /// completed.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    fn emit(&self, event: Event) {
        // send() only fails when nobody is subscribed
        self.event_tx.send(event).ok();
    }

    /// Run both stages and write the report
    ///
    /// # Errors
    /// Only fatal failures are returned: the locator list cannot be obtained,
    /// a working directory cannot be created, or the report cannot be written.
    pub async fn run(&self, source: &dyn LocatorSource) -> Result<RunSummary> {
        self.prepare_directories().await?;

        let locators = source.locators().await?;
        tracing::info!(count = locators.len(), "Loaded locators");
        self.emit(Event::LocatorsLoaded {
            count: locators.len(),
        });

        let fetch_report = self.fetch_stage(locators).await;
        let fetch_summary = fetch_report.summary();
        let fetch_error = fetch_report.partial_failure();
        if let Some(error) = &fetch_error {
            tracing::warn!(error = %error, "Fetch stage finished with failures");
        }
        tracing::info!(
            attempted = fetch_summary.attempted,
            succeeded = fetch_summary.succeeded,
            failed = fetch_summary.failed,
            "Fetch stage finished"
        );
        let (fetched, fetch_failures) = fetch_report.into_parts();

        let artifacts = distinct_artifacts(fetched);

        let scan_report = self.scan_stage(artifacts.clone()).await;
        let scan_summary = scan_report.summary();
        let scan_error = scan_report.partial_failure_with(|path| path.display().to_string());
        if let Some(error) = &scan_error {
            tracing::warn!(error = %error, "Scan stage finished with failures");
        }
        tracing::info!(
            attempted = scan_summary.attempted,
            succeeded = scan_summary.succeeded,
            failed = scan_summary.failed,
            "Scan stage finished"
        );
        let (scanned, scan_failures) = scan_report.into_parts();

        let matches = MatchSet::from_scans(scanned);
        let report = ReportData::new(self.config.query.clone(), matches);
        let report_path = self.config.report.output_path.clone();
        report.write_to(&report_path).await?;
        self.emit(Event::ReportWritten {
            path: report_path.clone(),
            files_matched: report.files_matched(),
            total_lines: report.total_lines(),
        });

        Ok(RunSummary {
            fetch: fetch_summary,
            scan: scan_summary,
            fetch_failures,
            scan_failures,
            partial_failures: fetch_error.into_iter().chain(scan_error).collect(),
            artifacts,
            report_path,
            files_matched: report.files_matched(),
            total_lines: report.total_lines(),
            cancelled: self.cancel_token.is_cancelled(),
        })
    }

    async fn prepare_directories(&self) -> Result<()> {
        create_working_dir(self.fetcher.download_dir()).await?;
        if let Some(parent) = self.config.report.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_working_dir(parent).await?;
        }
        Ok(())
    }

    async fn fetch_stage(&self, locators: Vec<String>) -> StageReport<String, FetchedArtifact> {
        let executor = BoundedExecutor::new("fetch", self.config.fetch.concurrency);
        let fetcher = Arc::clone(&self.fetcher);
        let cancel_token = self.cancel_token.clone();
        let event_tx = self.event_tx.clone();

        let outcomes = executor
            .run(locators, move |locator: String| {
                let fetcher = Arc::clone(&fetcher);
                let cancel_token = cancel_token.clone();
                let event_tx = event_tx.clone();
                async move {
                    if cancel_token.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    match fetcher.fetch(&locator).await {
                        Ok(artifact) => {
                            let event = if artifact.reused {
                                Event::FetchSkipped {
                                    locator: locator.clone(),
                                    artifact: artifact.path.clone(),
                                }
                            } else {
                                Event::FetchCompleted {
                                    locator: locator.clone(),
                                    artifact: artifact.path.clone(),
                                    bytes: artifact.bytes,
                                }
                            };
                            event_tx.send(event).ok();
                            Ok(artifact)
                        }
                        Err(e) => {
                            tracing::warn!(
                                locator = %locator,
                                error = %e,
                                code = e.error_code(),
                                "Fetch failed"
                            );
                            event_tx
                                .send(Event::FetchFailed {
                                    locator: locator.clone(),
                                    error: e.to_string(),
                                })
                                .ok();
                            Err(e)
                        }
                    }
                }
            })
            .await;

        StageReport::from_outcomes("fetch", outcomes)
    }

    async fn scan_stage(&self, artifacts: Vec<PathBuf>) -> StageReport<PathBuf, Vec<Vec<u8>>> {
        let executor = BoundedExecutor::new("scan", self.config.scan.concurrency);
        let scanner = Arc::new(Scanner::new(
            self.config.query.needle.clone(),
            &self.config.scan,
            self.cancel_token.clone(),
        ));
        let event_tx = self.event_tx.clone();

        let outcomes = executor
            .run(artifacts, move |artifact: PathBuf| {
                let scanner = Arc::clone(&scanner);
                let event_tx = event_tx.clone();
                async move {
                    match scanner.scan(artifact.clone()).await {
                        Ok(lines) => {
                            event_tx
                                .send(Event::ScanCompleted {
                                    artifact,
                                    matches: lines.len(),
                                })
                                .ok();
                            Ok(lines)
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %artifact.display(),
                                error = %e,
                                code = e.error_code(),
                                "Scan failed"
                            );
                            event_tx
                                .send(Event::ScanFailed {
                                    artifact,
                                    error: e.to_string(),
                                })
                                .ok();
                            Err(e)
                        }
                    }
                }
            })
            .await;

        StageReport::from_outcomes("scan", outcomes)
    }

    /// Delete fetched artifacts, returning how many were removed
    ///
    /// Missing files are skipped. Other removal errors are logged and do not stop
    /// the remaining deletions.
    pub async fn cleanup_artifacts(&self, artifacts: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                }
            }
        }
        tracing::info!(removed = removed, "Cleaned up artifacts");
        removed
    }
}

async fn create_working_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::WorkingDirectory {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Artifact paths in fetch order with duplicates removed
///
/// Two locators with the same file name resolve to one artifact, which is
/// scanned once.
fn distinct_artifacts(fetched: Vec<(String, FetchedArtifact)>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    fetched
        .into_iter()
        .filter_map(|(_, artifact)| {
            seen.insert(artifact.path.clone()).then_some(artifact.path)
        })
        .collect()
}
