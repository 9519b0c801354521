//! Periodic update checks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::checker::ReleaseChecker;
use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::proxy::ProxyResolver;
use crate::release::UpdateInfo;

/// Receives updates found by scheduled checks.
///
/// Called from a background task with no scheduler lock held, so a listener
/// may call back into the scheduler.
pub trait UpdateListener: Send + Sync {
    /// Called once for every scheduled check that finds a newer version.
    fn on_update_found(&self, info: Arc<UpdateInfo>);
}

impl<F> UpdateListener for F
where
    F: Fn(Arc<UpdateInfo>) + Send + Sync,
{
    fn on_update_found(&self, info: Arc<UpdateInfo>) {
        self(info);
    }
}

/// Forwards updates into a channel, typically drained by the UI task.
#[derive(Debug, Clone)]
pub struct ChannelListener(pub mpsc::UnboundedSender<Arc<UpdateInfo>>);

impl UpdateListener for ChannelListener {
    fn on_update_found(&self, info: Arc<UpdateInfo>) {
        if self.0.send(info).is_err() {
            tracing::debug!("Update receiver dropped, discarding notification");
        }
    }
}

struct SchedulerState {
    timer: Option<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    listener: Option<Arc<dyn UpdateListener>>,
}

struct Inner {
    checker: Arc<ReleaseChecker>,
    interval: Duration,
    state: Mutex<SchedulerState>,
    // Serializes checks from the timer and from `check_now`.
    check_lock: tokio::sync::Mutex<()>,
}

/// Runs a check at start and then every interval until stopped.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<Inner>,
}

impl UpdateScheduler {
    /// Creates a stopped scheduler that checks every `interval`.
    #[must_use]
    pub fn new(checker: Arc<ReleaseChecker>, interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                checker,
                interval,
                state: Mutex::new(SchedulerState {
                    timer: None,
                    stop_tx,
                    listener: None,
                }),
                check_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Creates a stopped scheduler from the updater configuration.
    pub fn from_config(
        current_version: impl Into<String>,
        config: &UpdaterConfig,
        proxy: Arc<dyn ProxyResolver>,
    ) -> Result<Self> {
        let checker = ReleaseChecker::new(current_version, config, proxy)?;
        Ok(Self::new(Arc::new(checker), config.check_interval()))
    }

    /// Registers the listener for discovered updates, replacing any previous
    /// one.
    pub fn set_listener(&self, listener: impl UpdateListener + 'static) {
        self.inner.lock_state().listener = Some(Arc::new(listener));
    }

    /// Starts checking: once right away, then every interval.
    ///
    /// Does nothing if already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.lock_state();
        if state.timer.is_some() {
            tracing::warn!("Update scheduler already started");
            return;
        }

        tracing::info!(
            "Starting automatic update scheduler (every {:?})",
            self.inner.interval
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_check().await });

        let stop_rx = state.stop_tx.subscribe();
        state.timer = Some(tokio::spawn(Arc::clone(&self.inner).tick(stop_rx)));
    }

    /// Stops the periodic checks. A check already running completes.
    ///
    /// Does nothing if not running.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        let Some(_timer) = state.timer.take() else {
            return;
        };

        tracing::info!("Stopping automatic update scheduler");
        let _ = state.stop_tx.send(true);
        // Fresh channel for the next start.
        state.stop_tx = watch::channel(false).0;
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock_state().timer.is_some()
    }

    /// Checks immediately and returns the result without notifying the
    /// listener. Waits for any check already in progress.
    pub async fn check_now(&self) -> Result<Option<Arc<UpdateInfo>>> {
        let _serial = self.inner.check_lock.lock().await;
        self.inner.checker.check_for_update().await
    }

    /// Returns the version updates are compared against.
    #[must_use]
    pub fn current_version(&self) -> &str {
        self.inner.checker.current_version()
    }

    /// Returns the cached result of the last successful check.
    #[must_use]
    pub fn last_update_info(&self) -> Option<Arc<UpdateInfo>> {
        self.inner.checker.last_update_info()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn tick(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let period = self.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_check().await,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::debug!("Update timer stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn run_check(&self) {
        let listener = self.lock_state().listener.clone();

        let result = {
            let _serial = self.check_lock.lock().await;
            tracing::debug!("Running scheduled update check");
            self.checker.check_for_update().await
        };

        match result {
            Ok(Some(info)) if info.has_update => {
                tracing::info!(
                    "Update available: {} -> {}",
                    info.current_version,
                    info.latest_version
                );
                if let Some(listener) = listener {
                    listener.on_update_found(info);
                }
            }
            Ok(_) => tracing::debug!("No updates available"),
            Err(e) => tracing::error!("Failed to check for updates: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::NoProxy;
    use mockito::{Matcher, Server};

    const NEWER_RELEASE: &str = r#"{
        "tag_name": "v9.9.9",
        "html_url": "https://github.com/charlie0129/batt/releases/tag/v9.9.9",
        "assets": [{
            "name": "batt-v9.9.9.dmg",
            "browser_download_url": "https://example.com/batt-v9.9.9.dmg",
            "size": 4096
        }]
    }"#;

    fn scheduler(server: &Server, interval: Duration) -> UpdateScheduler {
        let config = UpdaterConfig {
            feed_url: Some(format!("{}/latest", server.url())),
            ..Default::default()
        };
        let checker = ReleaseChecker::new("v1.0.0", &config, Arc::new(NoProxy)).unwrap();
        UpdateScheduler::new(Arc::new(checker), interval)
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let server = Server::new_async().await;
        let scheduler = scheduler(&server, Duration::from_secs(3600));

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_double_start_runs_one_check() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_body(NEWER_RELEASE)
            .expect(1)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_secs(3600));
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(300)).await;
        mock.assert_async().await;

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_listener_receives_update() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_body(NEWER_RELEASE)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.set_listener(ChannelListener(tx));
        scheduler.start();

        let info = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.latest_version, "v9.9.9");
        assert!(info.is_installable());
        assert_eq!(scheduler.last_update_info(), Some(info));

        scheduler.stop();
    }

    #[tokio::test]
    async fn test_failed_checks_keep_timer_running() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_millis(50));
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(scheduler.is_running());
        mock.assert_async().await;
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_body(NEWER_RELEASE)
            .expect(2)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_secs(3600));
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(scheduler.is_running());
        mock.assert_async().await;
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_listener_can_stop_scheduler() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body(NEWER_RELEASE)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_secs(3600));
        let handle = scheduler.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.set_listener(move |info: Arc<UpdateInfo>| {
            handle.stop();
            let _ = tx.send(info);
        });
        scheduler.start();

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_check_now_skips_listener() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_body(NEWER_RELEASE)
            .create_async()
            .await;

        let scheduler = scheduler(&server, Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.set_listener(ChannelListener(tx));

        let info = scheduler.check_now().await.unwrap().unwrap();
        assert!(info.has_update);
        assert_eq!(scheduler.current_version(), "v1.0.0");
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.is_running());
    }
}
