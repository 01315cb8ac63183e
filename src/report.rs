//! Plain-text report of matching lines.

use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::aggregate::MatchSet;
use crate::config::QueryConfig;
use crate::error::{Error, Result};

const RULE: &str = "========================================";

/// Everything the report writer needs, frozen once the scan stage is done
///
/// The counters are derived from the match set, so the header always agrees
/// with the sections below it.
#[derive(Clone, Debug, Serialize)]
pub struct ReportData {
    query: QueryConfig,
    matches: MatchSet,
    generated_at: DateTime<Utc>,
}

impl ReportData {
    /// Freeze a match set together with the query that produced it
    pub fn new(query: QueryConfig, matches: MatchSet) -> Self {
        Self {
            query,
            matches,
            generated_at: Utc::now(),
        }
    }

    /// Query parameters the report was produced for
    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    /// Matching lines per artifact
    pub fn matches(&self) -> &MatchSet {
        &self.matches
    }

    /// Number of artifacts with at least one match
    pub fn files_matched(&self) -> usize {
        self.matches.files_matched()
    }

    /// Total matching lines across all artifacts
    pub fn total_lines(&self) -> usize {
        self.matches.total_lines()
    }

    /// When the report data was frozen
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Render the report into `out`
    ///
    /// Layout: a `#` header block with the query and counters, one section per
    /// artifact (base name, match count, lines byte for byte), then a completion
    /// timestamp.
    pub fn render<W: Write>(&self, out: &mut W, completed_at: DateTime<Utc>) -> io::Result<()> {
        writeln!(out, "# CDN log search report")?;
        writeln!(out, "# Domain: {}", self.query.domain)?;
        writeln!(
            out,
            "# Time range: {} to {}",
            self.query.start_time, self.query.end_time
        )?;
        writeln!(out, "# Search term: {}", self.query.needle)?;
        writeln!(out, "# Generated: {}", timestamp(self.generated_at))?;
        writeln!(out, "# Files matched: {}", self.files_matched())?;
        writeln!(out, "# Total matching lines: {}", self.total_lines())?;
        writeln!(out, "{RULE}")?;
        writeln!(out)?;

        for (artifact, lines) in self.matches.iter() {
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| artifact.to_string_lossy());
            writeln!(out, "## File: {name}")?;
            writeln!(out, "Matching lines: {}", lines.len())?;
            for line in lines {
                out.write_all(line)?;
                out.write_all(b"\n")?;
            }
            writeln!(out)?;
        }

        writeln!(out, "{RULE}")?;
        writeln!(out, "# Completed: {}", timestamp(completed_at))
    }

    /// Render the report to bytes, stamped with the current time
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.render(&mut bytes, Utc::now());
        bytes
    }

    /// Write the report to `path`, replacing any existing file
    ///
    /// Failing to create or write the file is fatal for the run.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_bytes())
            .await
            .map_err(|e| Error::Report(format!("failed to write {}: {}", path.display(), e)))?;

        tracing::info!(
            path = %path.display(),
            files_matched = self.files_matched(),
            total_lines = self.total_lines(),
            "Report written"
        );
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
