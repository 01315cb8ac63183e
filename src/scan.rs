//! Scan stage: stream an artifact line by line and collect lines containing the needle.
//!
//! Compressed artifacts are decompressed on the fly. Lines are read into a
//! buffer that starts at `initial_line_bytes` and may grow to `max_line_bytes`;
//! a longer line fails the artifact rather than growing without bound.
//!
//! Matching works on raw bytes. Lines need not be valid UTF-8, and matches are
//! returned exactly as read, minus the line ending.
//!
//! The shared [`CancellationToken`] is checked before every line, so a
//! cancelled run stops each in-flight scan at its next line.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::error::{Error, Result};

/// Compression format of an artifact, detected from its file name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Plain text
    None,
    /// gzip (`.gz`), including multi-member streams
    Gzip,
}

impl Compression {
    /// Detect the compression format from the path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Worker for the scan stage
#[derive(Clone, Debug)]
pub struct Scanner {
    needle: String,
    initial_line_bytes: usize,
    max_line_bytes: usize,
    cancel_token: CancellationToken,
}

impl Scanner {
    /// Create a scanner for `needle` that observes `cancel_token`
    pub fn new(needle: impl Into<String>, config: &ScanConfig, cancel_token: CancellationToken) -> Self {
        Self {
            needle: needle.into(),
            initial_line_bytes: config.initial_line_bytes,
            max_line_bytes: config.max_line_bytes.max(1),
            cancel_token,
        }
    }

    /// The substring being searched for
    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// Scan an artifact on a blocking thread
    ///
    /// File reads and decompression are synchronous, so they run via
    /// `spawn_blocking` to keep runtime worker threads free for other scans.
    pub async fn scan(&self, artifact: PathBuf) -> Result<Vec<Vec<u8>>> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan_file(&artifact))
            .await
            .map_err(|e| Error::WorkerPanicked(format!("scan task failed: {}", e)))?
    }

    /// Scan an artifact synchronously
    ///
    /// Returns every matching line in file order; an empty vector means the
    /// artifact was read to the end without a match. Any read, decode, or
    /// line-length error fails the whole artifact; no partial result is returned.
    pub fn scan_file(&self, artifact: &Path) -> Result<Vec<Vec<u8>>> {
        let file = File::open(artifact)?;
        let matches = match Compression::from_path(artifact) {
            Compression::Gzip => {
                let decoder = MultiGzDecoder::new(file);
                self.scan_reader(decoder, artifact)
                    .map_err(|e| decompress_error(e, artifact))?
            }
            Compression::None => self.scan_reader(file, artifact)?,
        };

        tracing::debug!(
            path = %artifact.display(),
            matches = matches.len(),
            "Scanned artifact"
        );
        Ok(matches)
    }

    /// Scan any byte stream, using `artifact` only for error context
    pub fn scan_reader<R: Read>(&self, reader: R, artifact: &Path) -> Result<Vec<Vec<u8>>> {
        let needle = self.needle.as_bytes();
        let mut reader = BufReader::with_capacity(self.initial_line_bytes.max(1), reader);
        let mut line = Vec::new();
        let mut matches = Vec::new();

        loop {
            if self.cancel_token.is_cancelled() {
                tracing::debug!(path = %artifact.display(), "Scan cancelled");
                return Err(Error::Cancelled);
            }

            line.clear();
            if !read_bounded_line(&mut reader, &mut line, self.max_line_bytes)? {
                return Err(Error::LineTooLong {
                    path: artifact.to_path_buf(),
                    limit: self.max_line_bytes,
                });
            }
            if line.is_empty() {
                break;
            }

            let content = trim_line_ending(&line);
            if contains(content, needle) {
                matches.push(content.to_vec());
            }
        }

        Ok(matches)
    }
}

/// Read one line (including its `\n`, if any) into `buf`
///
/// Returns `Ok(false)` as soon as the line would exceed `max` bytes, without
/// buffering the rest of it. An empty `buf` after `Ok(true)` means end of stream.
fn read_bounded_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<bool> {
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(true);
        }

        let (chunk_len, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(newline) => (newline + 1, true),
            None => (available.len(), false),
        };

        // The trailing newline does not count toward the line length
        let content_len = buf.len() + chunk_len - usize::from(complete);
        if content_len > max {
            return Ok(false);
        }

        buf.extend_from_slice(&available[..chunk_len]);
        reader.consume(chunk_len);

        if complete {
            return Ok(true);
        }
    }
}

/// Byte substring search; an empty needle matches every line
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Strip a trailing `\n` or `\r\n`
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Attribute I/O errors raised while reading a compressed stream to the decoder
fn decompress_error(error: Error, artifact: &Path) -> Error {
    match error {
        Error::Io(e) => Error::Decompress {
            path: artifact.to_path_buf(),
            reason: e.to_string(),
        },
        other => other,
    }
}
