//! Result aggregation: partition stage outcomes and build the match set.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Outcome;

/// One item that failed in a stage
#[derive(Debug)]
pub struct ItemFailure<I> {
    /// The work item that failed
    pub item: I,
    /// Why it failed
    pub error: Error,
}

impl<I: Display> ItemFailure<I> {
    /// Human-readable "item: error" description
    pub fn describe(&self) -> String {
        self.describe_with(|item| item.to_string())
    }
}

impl<I> ItemFailure<I> {
    /// "label: error" description using a caller-supplied item label
    pub fn describe_with(&self, label: impl Fn(&I) -> String) -> String {
        format!("{}: {}", label(&self.item), self.error)
    }
}

/// Success/failure counts for one stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Items handed to the stage
    pub attempted: usize,
    /// Items whose worker succeeded
    pub succeeded: usize,
    /// Items whose worker failed
    pub failed: usize,
}

/// Outcomes of one stage, partitioned into successes and failures
///
/// Every outcome lands in exactly one bucket, so
/// `successes().len() + failures().len()` equals the number of items attempted.
#[derive(Debug)]
pub struct StageReport<I, T> {
    stage: &'static str,
    successes: Vec<(I, T)>,
    failures: Vec<ItemFailure<I>>,
}

impl<I, T> StageReport<I, T> {
    /// Partition a stage's outcomes
    pub fn from_outcomes(stage: &'static str, outcomes: Vec<Outcome<I, T>>) -> Self {
        let mut successes = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                Outcome::Success { item, value } => successes.push((item, value)),
                Outcome::Failure { item, error } => failures.push(ItemFailure { item, error }),
            }
        }

        Self {
            stage,
            successes,
            failures,
        }
    }

    /// Name of the stage these outcomes came from
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Successful items with their values
    pub fn successes(&self) -> &[(I, T)] {
        &self.successes
    }

    /// Failed items with their errors
    pub fn failures(&self) -> &[ItemFailure<I>] {
        &self.failures
    }

    /// Counts for this stage
    pub fn summary(&self) -> StageSummary {
        StageSummary {
            attempted: self.successes.len() + self.failures.len(),
            succeeded: self.successes.len(),
            failed: self.failures.len(),
        }
    }

    /// Split into successes and failures
    pub fn into_parts(self) -> (Vec<(I, T)>, Vec<ItemFailure<I>>) {
        (self.successes, self.failures)
    }
}

impl<I: Display, T> StageReport<I, T> {
    /// Composite error describing every failure, or `None` if nothing failed
    ///
    /// The error is informational: the successes are still available through
    /// [`StageReport::into_parts`].
    pub fn partial_failure(&self) -> Option<Error> {
        self.partial_failure_with(|item| item.to_string())
    }
}

impl<I, T> StageReport<I, T> {
    /// Like [`StageReport::partial_failure`], labelling items with `label`
    pub fn partial_failure_with(&self, label: impl Fn(&I) -> String) -> Option<Error> {
        if self.failures.is_empty() {
            return None;
        }
        let summary = self.summary();
        Some(Error::PartialFailure {
            stage: self.stage,
            failed: summary.failed,
            attempted: summary.attempted,
            details: self
                .failures
                .iter()
                .map(|failure| failure.describe_with(&label))
                .collect(),
        })
    }
}

/// Matching lines per artifact
///
/// Only artifacts with at least one match are stored; absence means zero
/// matches, not failure. Artifacts iterate in path order, lines in file order.
/// Lines are raw bytes without their line ending.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSet {
    files: BTreeMap<PathBuf, Vec<Vec<u8>>>,
}

impl MatchSet {
    /// Build a match set from successful scans, dropping artifacts without matches
    pub fn from_scans(scans: impl IntoIterator<Item = (PathBuf, Vec<Vec<u8>>)>) -> Self {
        let mut set = Self::default();
        for (artifact, lines) in scans {
            set.insert(artifact, lines);
        }
        set
    }

    /// Record the matches for one artifact; an empty list is ignored
    ///
    /// Inserting the same artifact twice keeps the later lines.
    pub fn insert(&mut self, artifact: PathBuf, lines: Vec<Vec<u8>>) {
        if lines.is_empty() {
            return;
        }
        self.files.insert(artifact, lines);
    }

    /// Matching lines for an artifact, if it had any
    pub fn get(&self, artifact: &Path) -> Option<&[Vec<u8>]> {
        self.files.get(artifact).map(Vec::as_slice)
    }

    /// Iterate artifacts and their matching lines
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[Vec<u8>])> {
        self.files
            .iter()
            .map(|(path, lines)| (path.as_path(), lines.as_slice()))
    }

    /// Number of artifacts with at least one match
    pub fn files_matched(&self) -> usize {
        self.files.len()
    }

    /// Total matching lines across all artifacts
    pub fn total_lines(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// True if nothing matched
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
