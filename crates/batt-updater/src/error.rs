//! Error types for the self-update system.

use thiserror::Error;

/// Errors that can occur while checking for or installing an update.
///
/// Every installer stage maps its failure to its own variant, so the rendered
/// message always names the stage that failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// The release feed could not be reached or returned a non-success status.
    #[error("failed to fetch latest release: {0}")]
    Fetch(String),

    /// The release feed returned a body that is not release metadata.
    #[error("failed to decode release metadata: {0}")]
    Decode(String),

    /// The update has no installer asset attached.
    #[error("no download URL available for update")]
    NoDownloadUrl,

    /// Another installation is already running.
    #[error("an update installation is already in progress")]
    Busy,

    /// Bad status or I/O failure while streaming the installer image.
    #[error("failed to download disk image: {0}")]
    Download(String),

    /// SHA-256 digest of the downloaded image does not match the feed.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected SHA-256 hash from the release feed.
        expected: String,
        /// Actual SHA-256 hash of the downloaded image.
        actual: String,
    },

    /// The disk image could not be attached.
    #[error("failed to mount disk image: {0}")]
    Mount(String),

    /// The disk image could not be detached.
    #[error("failed to unmount disk image: {0}")]
    Unmount(String),

    /// The new bundle (inside the image) or the installed bundle is missing.
    #[error("app bundle not found: {0}")]
    BundleNotFound(String),

    /// Both swap strategies failed.
    #[error("failed to install app bundle: {0}")]
    Swap(String),

    /// The new version could not be launched. Never fails an installation.
    #[error("failed to relaunch application: {0}")]
    Relaunch(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid updater configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl UpdateError {
    /// Returns a user-friendly error message suitable for display in a dialog.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Fetch(_) => {
                "Could not connect to GitHub. Please check your internet connection."
            }
            Self::Decode(_) => "The release information from GitHub could not be read.",
            Self::NoDownloadUrl => {
                "This update cannot be installed automatically. Please download it from the release page."
            }
            Self::Busy => "An update is already being installed.",
            Self::Download(_) => "Could not download the update. Please try again.",
            Self::ChecksumMismatch { .. } => {
                "Security verification failed. The download may have been tampered with."
            }
            Self::Mount(_) | Self::Unmount(_) => "Could not open the update disk image.",
            Self::BundleNotFound(_) => "Could not find the application to update.",
            Self::Swap(_) => "Could not install the update.",
            Self::Relaunch(_) => "The update was installed. Please restart batt manually.",
            Self::Io(_) | Self::Config(_) => "An unexpected error occurred.",
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::Download(_) | Self::Busy | Self::Io(_)
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Fetch(err.to_string())
        }
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
