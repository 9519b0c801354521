//! GitHub release feed types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extension of installer assets.
pub const INSTALLER_EXTENSION: &str = ".dmg";

/// Release metadata from the `releases/latest` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    /// The release tag name (e.g., "v0.3.1").
    pub tag_name: String,

    /// The release title.
    #[serde(default)]
    pub name: Option<String>,

    /// Publication timestamp.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// HTML URL to the release page.
    pub html_url: String,

    /// Release notes in markdown.
    #[serde(default)]
    pub body: Option<String>,

    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,

    /// Whether this is a draft release.
    #[serde(default)]
    pub draft: bool,

    /// Downloadable files attached to the release.
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    /// Returns the release notes.
    #[must_use]
    pub fn changelog(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Returns the release title, falling back to the tag.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.tag_name)
    }

    /// Returns `true` for releases that are never offered as updates.
    #[must_use]
    pub fn is_unpublished(&self) -> bool {
        self.prerelease || self.draft
    }

    /// Finds the first disk-image asset whose name contains `product_name`.
    #[must_use]
    pub fn find_installer_asset(&self, product_name: &str) -> Option<&GitHubAsset> {
        self.assets
            .iter()
            .find(|asset| asset.is_installer() && asset.name.contains(product_name))
    }
}

/// Downloadable file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubAsset {
    /// Asset file name (e.g., "batt-v0.3.1.dmg").
    pub name: String,

    /// Direct download URL.
    pub browser_download_url: String,

    /// File size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Content type (e.g., "application/x-apple-diskimage").
    #[serde(default)]
    pub content_type: String,

    /// SHA-256 digest (format: "sha256:..."), when GitHub has computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl GitHubAsset {
    /// Returns whether this asset is a disk image.
    #[must_use]
    pub fn is_installer(&self) -> bool {
        self.name.ends_with(INSTALLER_EXTENSION)
    }

    /// Returns the hex SHA-256 hash from the digest field, if available.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
    }
}
