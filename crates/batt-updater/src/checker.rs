//! Release checker: asks the feed whether a newer version exists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::github::GitHubClient;
use crate::proxy::ProxyResolver;
use crate::release::UpdateInfo;

#[derive(Debug, Default)]
struct CheckState {
    last_check: Option<DateTime<Utc>>,
    last_update_info: Option<Arc<UpdateInfo>>,
}

/// Checks the release feed and caches the last result.
#[derive(Debug)]
pub struct ReleaseChecker {
    current_version: String,
    product_name: String,
    check_interval: TimeDelta,
    client: GitHubClient,
    state: Mutex<CheckState>,
}

impl ReleaseChecker {
    /// Creates a checker for `current_version` using the feed in `config`.
    pub fn new(
        current_version: impl Into<String>,
        config: &UpdaterConfig,
        proxy: Arc<dyn ProxyResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let client = GitHubClient::new(config.feed_url(), &config.product_name, proxy)?;
        let check_interval = TimeDelta::from_std(config.check_interval()).unwrap_or(TimeDelta::MAX);

        Ok(Self {
            current_version: current_version.into(),
            product_name: config.product_name.clone(),
            check_interval,
            client,
            state: Mutex::new(CheckState::default()),
        })
    }

    /// Returns the version updates are compared against.
    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Fetches the latest release and compares it with the current version.
    ///
    /// Returns `Ok(None)` when the latest release is a prerelease or draft.
    /// Otherwise returns the update information, which may have
    /// `has_update == false`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Fetch`](crate::UpdateError::Fetch) if the feed cannot be
    /// reached or answers with a non-success status,
    /// [`UpdateError::Decode`](crate::UpdateError::Decode) if the body is not
    /// release metadata.
    pub async fn check_for_update(&self) -> Result<Option<Arc<UpdateInfo>>> {
        tracing::debug!(
            feed = %self.client.feed_url(),
            "Checking for updates (current version: {})",
            self.current_version
        );

        let release = self.client.get_latest_release().await?;

        if release.is_unpublished() {
            tracing::debug!(
                "Latest release {} is prerelease or draft, skipping",
                release.display_name()
            );
            self.record(None);
            return Ok(None);
        }

        let info = Arc::new(UpdateInfo::from_release(
            &self.current_version,
            &release,
            &self.product_name,
        ));
        self.record(Some(Arc::clone(&info)));

        tracing::debug!(
            release = %release.display_name(),
            current_version = %info.current_version,
            latest_version = %info.latest_version,
            has_update = info.has_update,
            "Update check completed"
        );

        Ok(Some(info))
    }

    /// Returns `true` if no check has run yet or the check interval elapsed.
    #[must_use]
    pub fn should_check_update(&self) -> bool {
        match self.lock_state().last_check {
            None => true,
            Some(last) => Utc::now().signed_duration_since(last) > self.check_interval,
        }
    }

    /// Returns when the feed was last fetched successfully.
    #[must_use]
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_check
    }

    /// Returns the cached result of the last successful check.
    #[must_use]
    pub fn last_update_info(&self) -> Option<Arc<UpdateInfo>> {
        self.lock_state().last_update_info.clone()
    }

    fn record(&self, info: Option<Arc<UpdateInfo>>) {
        let mut state = self.lock_state();
        state.last_check = Some(Utc::now());
        state.last_update_info = info;
    }

    fn lock_state(&self) -> MutexGuard<'_, CheckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
