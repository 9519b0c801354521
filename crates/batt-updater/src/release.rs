//! Update information derived from a release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::GitHubRelease;
use crate::version::is_newer_version;

/// Rendered by [`format_download_size`] for sizes that are not positive.
pub const UNKNOWN_SIZE: &str = "Unknown size";

/// Result of one update check.
///
/// Built once per check and never modified afterwards; a later check produces
/// a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Version of the running application.
    pub current_version: String,

    /// Tag of the latest published release.
    pub latest_version: String,

    /// Whether `latest_version` is newer than `current_version`.
    pub has_update: bool,

    /// Release page for manual downloads.
    pub release_url: String,

    /// Installer image URL. Empty when the release has no matching asset.
    pub download_url: String,

    /// Installer image size in bytes (0 when unknown).
    pub download_size: u64,

    /// Expected SHA-256 (hex) of the installer image, when the feed has one.
    pub sha256: Option<String>,

    /// Release notes in markdown.
    pub release_notes: String,

    /// When the release was published.
    pub published_at: Option<DateTime<Utc>>,
}

impl UpdateInfo {
    /// Builds update information for `release` as seen from `current_version`.
    ///
    /// The installer asset is the first `.dmg` whose name contains
    /// `product_name`. Without one, `download_url` stays empty while
    /// `has_update` still reflects the version comparison.
    #[must_use]
    pub fn from_release(current_version: &str, release: &GitHubRelease, product_name: &str) -> Self {
        let asset = release.find_installer_asset(product_name);

        Self {
            current_version: current_version.to_string(),
            latest_version: release.tag_name.clone(),
            has_update: is_newer_version(&release.tag_name, current_version),
            release_url: release.html_url.clone(),
            download_url: asset
                .map(|a| a.browser_download_url.clone())
                .unwrap_or_default(),
            download_size: asset.map_or(0, |a| a.size),
            sha256: asset.and_then(|a| a.sha256()).map(str::to_lowercase),
            release_notes: release.changelog().to_string(),
            published_at: release.published_at,
        }
    }

    /// Returns whether the update can be installed in-app.
    #[must_use]
    pub fn is_installable(&self) -> bool {
        self.has_update && !self.download_url.is_empty()
    }

    /// Classifies this result for the UI.
    #[must_use]
    pub fn availability(&self) -> UpdateAvailability {
        if !self.has_update {
            UpdateAvailability::UpToDate
        } else if self.download_url.is_empty() {
            tracing::warn!(
                "Update {} has no installer asset, manual download required",
                self.latest_version
            );
            UpdateAvailability::ManualDownload {
                release_url: self.release_url.clone(),
            }
        } else {
            UpdateAvailability::Installable
        }
    }

    /// Returns the human-readable download size.
    #[must_use]
    pub fn human_download_size(&self) -> String {
        format_download_size(i64::try_from(self.download_size).unwrap_or(i64::MAX))
    }
}

/// How the UI should present an update check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAvailability {
    /// Nothing newer. Stay silent.
    UpToDate,
    /// A newer release exists but has no installer; send the user to the page.
    ManualDownload {
        /// Release page URL.
        release_url: String,
    },
    /// A newer release with an installer; offer in-app installation.
    Installable,
}

/// Formats a byte count as a human-readable string (e.g., "30.0 MB").
///
/// Non-positive sizes render as [`UNKNOWN_SIZE`].
#[must_use]
pub fn format_download_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes <= 0 {
        return UNKNOWN_SIZE.to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.1} {}", UNITS[unit])
}
