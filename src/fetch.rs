//! Fetch stage: materialize a remote log file as a local artifact.
//!
//! A locator whose artifact already exists is reused without touching the
//! network. Otherwise the body is streamed into a uniquely named
//! `.<name>.XXXXXX.part` file in the download directory and renamed to `<name>`
//! only once it is complete, so an existing artifact is always a finished
//! download. Concurrent fetches of the same name never share a temporary file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::config::FetchConfig;
use crate::error::{Error, Result};

/// Suffix of in-progress downloads
const PART_SUFFIX: &str = ".part";

/// An artifact produced (or reused) by the fetch stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Local path of the artifact
    pub path: PathBuf,
    /// Bytes written by this fetch (0 when reused)
    pub bytes: u64,
    /// True when the artifact already existed and no request was made
    pub reused: bool,
}

/// Normalize one line of a locator list
///
/// Returns `None` for blank lines. Lines without an explicit `http` scheme get
/// `https://` prepended.
pub fn normalize_locator(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with("http") {
        Some(line.to_string())
    } else {
        Some(format!("https://{}", line))
    }
}

/// Derive the local file name for a locator
///
/// The name is the last non-empty path segment with any query component
/// stripped. Two locators with the same last segment map to the same name;
/// that collision is not detected.
pub fn artifact_name(locator: &str) -> Result<String> {
    let name = match url::Url::parse(locator) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(str::to_string),
        // Not a parseable URL: fall back to plain string handling
        Err(_) => locator
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(str::to_string),
    };

    name.filter(|n| n != "." && n != "..")
        .ok_or_else(|| Error::Other(format!("cannot derive a file name from locator '{locator}'")))
}

/// Create a uniquely named in-progress file in `dir` for the artifact `name`
///
/// The returned [`TempPath`] deletes the file when dropped unless it is
/// persisted or kept.
fn create_part_file(dir: &Path, name: &str) -> Result<(std::fs::File, TempPath)> {
    let file = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)?;
    Ok(file.into_parts())
}

/// Worker for the fetch stage
///
/// Cheap to share: wrap in an `Arc` and hand clones to every fetch task.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    download_dir: PathBuf,
    pacing_delay: Duration,
    keep_partial: bool,
}

impl Fetcher {
    /// Build a fetcher with a client carrying the configured user agent and timeout
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            download_dir: config.download_dir.clone(),
            pacing_delay: config.pacing_delay,
            keep_partial: config.keep_partial,
        })
    }

    /// Directory artifacts are written to
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Local artifact path for a locator
    pub fn artifact_path(&self, locator: &str) -> Result<PathBuf> {
        Ok(self.download_dir.join(artifact_name(locator)?))
    }

    /// Fetch one locator into its artifact
    ///
    /// Reuses an existing artifact without any network access. Otherwise makes a
    /// single request (no retry); a non-2xx status or transport error fails
    /// this locator only. The pacing delay is applied after every network
    /// attempt, successful or not.
    pub async fn fetch(&self, locator: &str) -> Result<FetchedArtifact> {
        let path = self.artifact_path(locator)?;

        if tokio::fs::metadata(&path).await.is_ok() {
            tracing::debug!(locator = %locator, path = %path.display(), "Artifact exists, skipping fetch");
            return Ok(FetchedArtifact {
                path,
                bytes: 0,
                reused: true,
            });
        }

        let result = self.download(locator, &path).await;

        if !self.pacing_delay.is_zero() {
            tokio::time::sleep(self.pacing_delay).await;
        }

        result.map(|bytes| FetchedArtifact {
            path,
            bytes,
            reused: false,
        })
    }

    async fn download(&self, locator: &str, path: &Path) -> Result<u64> {
        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(locator = %locator, "Fetch timed out");
            }
            Error::Network(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: locator.to_string(),
                status: status.as_u16(),
            });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (file, part) = create_part_file(&self.download_dir, &name)?;

        match write_body(response, file).await {
            Ok(bytes) => {
                // Replaces an artifact a concurrent fetch of the same name persisted first
                part.persist(path).map_err(|e| Error::Io(e.error))?;
                tracing::debug!(locator = %locator, path = %path.display(), bytes = bytes, "Fetched artifact");
                Ok(bytes)
            }
            Err(e) => {
                if self.keep_partial {
                    match part.keep() {
                        Ok(kept) => {
                            tracing::warn!(path = %kept.display(), error = %e, "Keeping partial download");
                        }
                        Err(keep_err) => {
                            tracing::warn!(error = %keep_err.error, "Failed to keep partial download");
                        }
                    }
                }
                Err(e)
            }
        }
    }
}

/// Stream a response body into a file, returning the number of bytes written
async fn write_body(response: reqwest::Response, file: std::fs::File) -> Result<u64> {
    let mut file = tokio::fs::File::from_std(file);
    let mut body = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher(dir: &Path) -> Fetcher {
        Fetcher::new(&FetchConfig {
            download_dir: dir.to_path_buf(),
            pacing_delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn normalize_locator_adds_missing_scheme() {
        assert_eq!(
            normalize_locator("cdn-logs.example.com/a/b.gz?auth=1").as_deref(),
            Some("https://cdn-logs.example.com/a/b.gz?auth=1")
        );
        assert_eq!(
            normalize_locator("  http://plain.example.com/x.gz \n").as_deref(),
            Some("http://plain.example.com/x.gz")
        );
        assert_eq!(
            normalize_locator("https://secure.example.com/y.gz").as_deref(),
            Some("https://secure.example.com/y.gz")
        );
        assert_eq!(normalize_locator("   "), None);
    }

    #[test]
    fn artifact_name_strips_query_and_takes_last_segment() {
        assert_eq!(
            artifact_name("https://cdn.example.com/v1/2024_05_01/site.com_2024_05_01_0000_0100.gz?auth_key=abc/def")
                .unwrap(),
            "site.com_2024_05_01_0000_0100.gz"
        );
        assert_eq!(
            artifact_name("https://cdn.example.com/logs/access.log").unwrap(),
            "access.log"
        );
        assert_eq!(
            artifact_name("https://cdn.example.com/logs/dir/").unwrap(),
            "dir"
        );
    }

    #[test]
    fn artifact_name_rejects_locators_without_a_path() {
        assert!(artifact_name("https://cdn.example.com/").is_err());
        assert!(artifact_name("https://cdn.example.com").is_err());
    }

    /// In-progress files left in `dir`
    fn part_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(PART_SUFFIX))
            .collect()
    }

    #[test]
    fn part_files_are_unique_per_fetch() {
        let temp_dir = TempDir::new().unwrap();

        let (_first_file, first) = create_part_file(temp_dir.path(), "a.gz").unwrap();
        let (_second_file, second) = create_part_file(temp_dir.path(), "a.gz").unwrap();

        assert_ne!(first.to_path_buf(), second.to_path_buf());
        assert_eq!(part_files(temp_dir.path()).len(), 2);

        drop(first);
        drop(second);
        assert!(part_files(temp_dir.path()).is_empty(), "dropped part files are removed");
    }

    #[tokio::test]
    async fn fetch_streams_body_and_sends_user_agent() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;
        let agent = FetchConfig::default().user_agent;

        Mock::given(method("GET"))
            .and(path("/logs/a.log"))
            .and(header("user-agent", agent.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"line one\nline two\n".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = test_fetcher(temp_dir.path());
        let url = format!("{}/logs/a.log?sig=123", mock_server.uri());
        let artifact = fetcher.fetch(&url).await.unwrap();

        assert_eq!(artifact.path, temp_dir.path().join("a.log"));
        assert_eq!(artifact.bytes, 18);
        assert!(!artifact.reused);
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "line one\nline two\n"
        );
        assert!(part_files(temp_dir.path()).is_empty(), "part file must be renamed away");
    }

    #[tokio::test]
    async fn second_fetch_reuses_artifact_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/b.log"))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .expect(1) // verified when mock_server is dropped
            .mount(&mock_server)
            .await;

        let fetcher = test_fetcher(temp_dir.path());
        let url = format!("{}/b.log", mock_server.uri());

        let first = fetcher.fetch(&url).await.unwrap();
        let second = fetcher.fetch(&url).await.unwrap();

        assert_eq!(first.path, second.path);
        assert!(second.reused);
        assert_eq!(second.bytes, 0);
    }

    #[tokio::test]
    async fn existing_file_short_circuits_even_if_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        std::fs::write(temp_dir.path().join("c.gz"), b"not really gzip").unwrap();
        let fetcher = test_fetcher(temp_dir.path());

        let artifact = fetcher
            .fetch(&format!("{}/c.gz", mock_server.uri()))
            .await
            .unwrap();
        assert!(artifact.reused);
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure_and_leaves_no_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing.gz"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = test_fetcher(temp_dir.path());
        let url = format!("{}/missing.gz", mock_server.uri());

        match fetcher.fetch(&url).await {
            Err(Error::HttpStatus { url: failed, status }) => {
                assert_eq!(failed, url);
                assert_eq!(status, 404);
            }
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
        assert!(!temp_dir.path().join("missing.gz").exists());
        assert!(part_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn timeout_is_a_network_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchConfig {
            download_dir: temp_dir.path().to_path_buf(),
            pacing_delay: Duration::ZERO,
            timeout: Duration::from_millis(200),
            ..FetchConfig::default()
        })
        .unwrap();

        let err = fetcher
            .fetch(&format!("{}/slow.gz", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref e) if e.is_timeout()), "got {err:?}");
        assert!(!temp_dir.path().join("slow.gz").exists());
    }

    #[tokio::test]
    async fn pacing_delay_applies_after_network_attempts() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::new(&FetchConfig {
            download_dir: temp_dir.path().to_path_buf(),
            pacing_delay: Duration::from_millis(150),
            ..FetchConfig::default()
        })
        .unwrap();

        let started = std::time::Instant::now();
        let result = fetcher
            .fetch(&format!("{}/err.gz", mock_server.uri()))
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn concurrent_fetches_of_one_name_produce_one_complete_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;
        let body_a = vec![b'A'; 200_000];
        let body_b = vec![b'B'; 150_000];

        Mock::given(method("GET"))
            .and(path("/a/access.log"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body_a.clone())
                    .set_delay(Duration::from_millis(20)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/access.log"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body_b.clone())
                    .set_delay(Duration::from_millis(20)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = test_fetcher(temp_dir.path());
        let url_a = format!("{}/a/access.log", mock_server.uri());
        let url_b = format!("{}/b/access.log", mock_server.uri());

        let (a, b) = tokio::join!(fetcher.fetch(&url_a), fetcher.fetch(&url_b));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.path, b.path);
        let content = std::fs::read(&a.path).unwrap();
        assert!(
            content == body_a || content == body_b,
            "artifact mixes both bodies ({} bytes)",
            content.len()
        );
        assert!(part_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn reused_artifact_skips_pacing_delay() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("cached.log"), b"10.0.0.1 cached\n").unwrap();

        let fetcher = Fetcher::new(&FetchConfig {
            download_dir: temp_dir.path().to_path_buf(),
            pacing_delay: Duration::from_secs(30),
            ..FetchConfig::default()
        })
        .unwrap();

        let artifact = tokio::time::timeout(
            Duration::from_secs(2),
            fetcher.fetch("https://cdn.example.invalid/logs/cached.log"),
        )
        .await
        .expect("reused artifact must not wait for pacing")
        .unwrap();

        assert!(artifact.reused);
    }
}
