//! Streaming download of the installer image with progress reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::verify::StreamingHasher;
use crate::error::{Result, UpdateError};
use crate::release::format_download_size;

/// Timeout for the whole installer download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress is reported at multiples of this many percent.
const PROGRESS_STEP: u8 = 10;

/// Download progress event, emitted once per crossed 10% boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes to download.
    pub total: u64,
    /// Boundary that was crossed (10, 20, ..., 100).
    pub percent: u8,
}

/// Receives download progress events.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Tracks which 10% boundaries have already been reported.
#[derive(Debug)]
pub struct ProgressTracker {
    downloaded: u64,
    total: u64,
    last_reported: u8,
}

impl ProgressTracker {
    /// Creates a tracker for a download of `total` bytes.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            downloaded: 0,
            total,
            last_reported: 0,
        }
    }

    /// Bytes counted so far.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Records `bytes` more and returns the boundaries crossed by this chunk,
    /// in increasing order. Each boundary is returned at most once.
    pub fn advance(&mut self, bytes: u64) -> Vec<u8> {
        self.downloaded = self.downloaded.saturating_add(bytes);
        if self.total == 0 {
            return Vec::new();
        }

        let percent = (u128::from(self.downloaded) * 100 / u128::from(self.total)).min(100);
        // `percent` is at most 100 here.
        let reached = (percent as u8 / PROGRESS_STEP) * PROGRESS_STEP;

        let crossed: Vec<u8> = (self.last_reported + PROGRESS_STEP..=reached)
            .step_by(usize::from(PROGRESS_STEP))
            .collect();
        if let Some(&last) = crossed.last() {
            self.last_reported = last;
        }
        crossed
    }
}

/// A disk image written to disk.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    /// Where the image was written.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
    /// Lowercase hex SHA-256 of the written bytes.
    pub sha256: String,
}

/// Streams `url` into `dest`, hashing as it goes.
///
/// Progress is only reported when the server announces a content length.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    on_progress: Option<&ProgressCallback>,
) -> Result<DownloadedImage> {
    tracing::info!("Starting download from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| UpdateError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpdateError::Download(format!("bad status: {status}")));
    }

    let mut tracker = response
        .content_length()
        .filter(|total| *total > 0)
        .map(ProgressTracker::new);

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| UpdateError::Download(format!("failed to create {}: {e}", dest.display())))?;
    let mut hasher = StreamingHasher::default();
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdateError::Download(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdateError::Download(format!("failed to write image: {e}")))?;
        hasher.update(&chunk);
        written += chunk.len() as u64;

        if let Some(tracker) = tracker.as_mut() {
            for percent in tracker.advance(chunk.len() as u64) {
                tracing::info!(percent, "Download progress");
                if let Some(callback) = on_progress {
                    callback(DownloadProgress {
                        downloaded: tracker.downloaded(),
                        total: tracker.total,
                        percent,
                    });
                }
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| UpdateError::Download(format!("failed to write image: {e}")))?;

    tracing::info!(
        "Download complete: {}",
        format_download_size(i64::try_from(written).unwrap_or(i64::MAX))
    );

    Ok(DownloadedImage {
        path: dest.to_path_buf(),
        size: written,
        sha256: hasher.finish(),
    })
}
