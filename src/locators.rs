//! Sources of locators (remote log file URLs) for the fetch stage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::fetch::normalize_locator;

/// Provides the list of locators to fetch
///
/// Failing to produce the list is fatal for the run: nothing can be fetched
/// without it. Implementations return normalized locators in the order they
/// should be attempted.
///
/// # Examples
///
/// ```
/// use cdn_log_dl::locators::{LocatorSource, StaticLocatorSource};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = StaticLocatorSource::new(["cdn.example.com/logs/a.gz", ""]);
/// let locators = source.locators().await?;
/// assert_eq!(locators, vec!["https://cdn.example.com/logs/a.gz".to_string()]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait LocatorSource: Send + Sync {
    /// Return every locator to fetch
    async fn locators(&self) -> Result<Vec<String>>;
}

/// Reads a newline-separated locator list from disk
///
/// This is the format the log-query API's output is saved in. Blank lines are
/// skipped and every line is normalized.
#[derive(Clone, Debug)]
pub struct FileLocatorSource {
    path: PathBuf,
}

impl FileLocatorSource {
    /// Source backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the locators are read from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocatorSource for FileLocatorSource {
    async fn locators(&self) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::LocatorSource(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let locators: Vec<String> = content.lines().filter_map(normalize_locator).collect();
        tracing::debug!(path = %self.path.display(), count = locators.len(), "Loaded locator list");
        Ok(locators)
    }
}

/// A fixed list of locators
#[derive(Clone, Debug, Default)]
pub struct StaticLocatorSource {
    locators: Vec<String>,
}

impl StaticLocatorSource {
    /// Source that yields `locators`, normalized, blanks removed
    pub fn new<S: AsRef<str>>(locators: impl IntoIterator<Item = S>) -> Self {
        Self {
            locators: locators
                .into_iter()
                .filter_map(|l| normalize_locator(l.as_ref()))
                .collect(),
        }
    }
}

#[async_trait]
impl LocatorSource for StaticLocatorSource {
    async fn locators(&self) -> Result<Vec<String>> {
        Ok(self.locators.clone())
    }
}

/// Persist a locator list one per line so a later run can read it back with
/// [`FileLocatorSource`]
pub async fn save_locators(path: &Path, locators: &[String]) -> Result<()> {
    let mut content = String::new();
    for locator in locators {
        content.push_str(locator);
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    tracing::debug!(path = %path.display(), count = locators.len(), "Saved locator list");
    Ok(())
}
