//! Configuration types for the update system.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};
use crate::proxy::{NoProxy, ProxyResolver, SystemProxy};

/// GitHub API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default repository owner.
pub const DEFAULT_OWNER: &str = "charlie0129";

/// Default repository name.
pub const DEFAULT_REPO: &str = "batt";

/// Default product name, matched against installer asset names.
pub const DEFAULT_PRODUCT_NAME: &str = "batt";

/// Default hours between automatic update checks.
pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 24;

/// Longest accepted interval between automatic checks (one year).
pub const MAX_CHECK_INTERVAL_HOURS: u64 = 24 * 365;

/// Settings for checking and installing updates.
///
/// Every field has a default, so a partial config file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Whether automatic update checking is enabled.
    pub enabled: bool,

    /// Repository owner on GitHub.
    pub owner: String,

    /// Repository name on GitHub.
    pub repo: String,

    /// Product name. Installer assets must contain it.
    pub product_name: String,

    /// File name of the application bundle, inside the disk image and on disk.
    pub bundle_name: String,

    /// Explicit release feed URL. Derived from `owner`/`repo` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,

    /// Hours between automatic checks.
    pub check_interval_hours: u64,

    /// Directories searched for the installed bundle when the running
    /// executable is not inside one.
    pub install_dirs: Vec<PathBuf>,

    /// Static proxy settings used instead of the system proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<SystemProxy>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let mut install_dirs = vec![PathBuf::from("/Applications")];
        if let Some(home) = std::env::var_os("HOME") {
            install_dirs.push(PathBuf::from(home).join("Applications"));
        }

        Self {
            enabled: true,
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            bundle_name: format!("{DEFAULT_PRODUCT_NAME}.app"),
            feed_url: None,
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            install_dirs,
            proxy: None,
        }
    }
}

impl UpdaterConfig {
    /// Returns the release feed URL.
    #[must_use]
    pub fn feed_url(&self) -> String {
        match &self.feed_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/repos/{}/{}/releases/latest",
                GITHUB_API_URL, self.owner, self.repo
            ),
        }
    }

    /// Returns the interval between automatic checks.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(60 * 60))
    }

    /// Returns candidate bundle paths inside the fallback install directories.
    #[must_use]
    pub fn fallback_bundle_paths(&self) -> Vec<PathBuf> {
        self.install_dirs
            .iter()
            .map(|dir| dir.join(&self.bundle_name))
            .collect()
    }

    /// Returns the configured static proxy, or a direct connection.
    ///
    /// Hosts that read the system proxy settings pass their own resolver
    /// instead.
    #[must_use]
    pub fn proxy_resolver(&self) -> Arc<dyn ProxyResolver> {
        match &self.proxy {
            Some(proxy) if !proxy.is_direct() => Arc::new(proxy.clone()),
            _ => Arc::new(NoProxy),
        }
    }

    /// Checks that the settings can drive an update.
    pub fn validate(&self) -> Result<()> {
        if self.product_name.trim().is_empty() {
            return Err(UpdateError::Config("product_name must not be empty".into()));
        }
        if !self.bundle_name.ends_with(".app") {
            return Err(UpdateError::Config(format!(
                "bundle_name must end with .app, got {:?}",
                self.bundle_name
            )));
        }
        if self.check_interval_hours == 0 {
            return Err(UpdateError::Config(
                "check_interval_hours must be at least 1".into(),
            ));
        }
        if self.check_interval_hours > MAX_CHECK_INTERVAL_HOURS {
            return Err(UpdateError::Config(format!(
                "check_interval_hours must be at most {MAX_CHECK_INTERVAL_HOURS}, got {}",
                self.check_interval_hours
            )));
        }
        if self.feed_url.is_none() && (self.owner.is_empty() || self.repo.is_empty()) {
            return Err(UpdateError::Config(
                "owner and repo are required when feed_url is not set".into(),
            ));
        }
        Ok(())
    }
}
