//! Downloads, mounts and installs a new application bundle.
//!
//! An installation runs the stages in [`crate::steps`] in order:
//!
//! 1. Stream the disk image to a temporary file (progress at every 10%)
//! 2. Check the SHA-256 digest when the release publishes one
//! 3. Attach the image and find the new bundle at its root
//! 4. Find the installed bundle and swap it, keeping a backup
//! 5. Detach the image
//!
//! [`UpdateInstaller::download_and_install`] returns once the files are in
//! place. Backup cleanup and then the relaunch run in the background; the
//! relaunch result arrives on [`InstallOutcome::relaunch`]. The installer
//! stays busy until both have finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};
use crate::proxy::{ProxyResolver, build_http_client};
use crate::release::UpdateInfo;
use crate::steps::bundle::{find_new_bundle, locate_installed_bundle};
use crate::steps::download::{DOWNLOAD_TIMEOUT, DownloadProgress, ProgressCallback, download_to_file};
use crate::steps::mount::{DiskImageMounter, Hdiutil, MountedImage};
use crate::steps::relaunch::{OpenApplication, Relauncher};
use crate::steps::swap::{SwapStrategy, remove_backup, swap_bundle};
use crate::steps::verify::verify_sha256;

/// Delay before the backup of the previous bundle is deleted.
pub const BACKUP_GRACE: Duration = Duration::from_secs(5);

/// Delay between a successful swap and the relaunch.
pub const RELAUNCH_DELAY: Duration = Duration::from_secs(2);

/// User agent for installer downloads.
const USER_AGENT_VALUE: &str = concat!("batt-updater/", env!("CARGO_PKG_VERSION"));

/// Installer settings.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    /// Bundle file name inside the image and on disk.
    pub bundle_name: String,

    /// Installed bundle candidates, used when the running executable is not
    /// inside a bundle.
    pub fallback_bundle_paths: Vec<PathBuf>,

    /// Executable to locate the installed bundle from. Defaults to the
    /// running executable.
    pub executable: Option<PathBuf>,

    /// Parent of the scratch directory used by the staging swap. Defaults
    /// to the system temp directory.
    pub staging_dir: Option<PathBuf>,

    /// Timeout for the whole download.
    pub download_timeout: Duration,

    /// Delay before the backup is deleted.
    pub backup_grace: Duration,

    /// Delay before the new version is launched.
    pub relaunch_delay: Duration,
}

impl InstallerOptions {
    /// Builds options from the updater configuration.
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            bundle_name: config.bundle_name.clone(),
            fallback_bundle_paths: config.fallback_bundle_paths(),
            executable: None,
            staging_dir: None,
            download_timeout: DOWNLOAD_TIMEOUT,
            backup_grace: BACKUP_GRACE,
            relaunch_delay: RELAUNCH_DELAY,
        }
    }
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self::from_config(&UpdaterConfig::default())
    }
}

/// Result of an installation whose files are in place.
#[derive(Debug)]
pub struct InstallOutcome {
    /// The bundle that now holds the new version.
    pub bundle_path: PathBuf,

    /// Which swap strategy succeeded.
    pub strategy: SwapStrategy,

    /// Backup of the previous bundle, deleted after the grace delay.
    pub backup: Option<PathBuf>,

    /// Completes when the backup is gone and the relaunch has been
    /// attempted. A relaunch failure does not undo the installation.
    pub relaunch: oneshot::Receiver<Result<()>>,
}

/// Installs updates from disk images.
pub struct UpdateInstaller {
    client: reqwest::Client,
    options: InstallerOptions,
    mounter: Arc<dyn DiskImageMounter>,
    relauncher: Arc<dyn Relauncher>,
    on_progress: Option<ProgressCallback>,
    in_flight: Arc<AtomicBool>,
}

impl UpdateInstaller {
    /// Creates an installer that mounts with `hdiutil` and relaunches with
    /// `open`.
    pub fn new(options: InstallerOptions, proxy: Arc<dyn ProxyResolver>) -> Result<Self> {
        let client = build_http_client(options.download_timeout, USER_AGENT_VALUE, proxy)?;

        Ok(Self {
            client,
            options,
            mounter: Arc::new(Hdiutil),
            relauncher: Arc::new(OpenApplication),
            on_progress: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the disk image mounter.
    #[must_use]
    pub fn with_mounter(mut self, mounter: Arc<dyn DiskImageMounter>) -> Self {
        self.mounter = mounter;
        self
    }

    /// Replaces the relauncher.
    #[must_use]
    pub fn with_relauncher(mut self, relauncher: Arc<dyn Relauncher>) -> Self {
        self.relauncher = relauncher;
        self
    }

    /// Registers a callback for download progress.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(DownloadProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Returns `true` while an installation, or the backup cleanup and
    /// relaunch that follow it, is running.
    #[must_use]
    pub fn is_installing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Downloads the update's disk image and installs the bundle inside it.
    ///
    /// Returns once the new bundle is in place. The backup is removed after
    /// [`InstallerOptions::backup_grace`], then the new version is launched
    /// after [`InstallerOptions::relaunch_delay`] and the current process
    /// ends. Further installs fail with [`UpdateError::Busy`] until then.
    ///
    /// # Errors
    ///
    /// [`UpdateError::NoDownloadUrl`] if the release has no installer,
    /// [`UpdateError::Busy`] if another installation is running, otherwise
    /// the error of the stage that failed. The installed bundle is left
    /// unchanged unless the error is [`UpdateError::Swap`] and says the
    /// current app could not be removed or restored.
    pub async fn download_and_install(&self, info: &UpdateInfo) -> Result<InstallOutcome> {
        if info.download_url.is_empty() {
            return Err(UpdateError::NoDownloadUrl);
        }
        let guard = InFlightGuard::acquire(&self.in_flight)?;

        tracing::info!(
            version = %info.latest_version,
            url = %info.download_url,
            size = %info.human_download_size(),
            "Downloading DMG update"
        );

        let temp_dir = tempfile::Builder::new()
            .prefix("batt-update-")
            .tempdir()
            .map_err(|e| UpdateError::Io(format!("failed to create temp directory: {e}")))?;
        let image_path = temp_dir.path().join("update.dmg");

        let image = download_to_file(
            &self.client,
            &info.download_url,
            &image_path,
            self.on_progress.as_ref(),
        )
        .await?;

        match &info.sha256 {
            Some(expected) => verify_sha256(&image.sha256, expected)?,
            None => tracing::info!("Release has no digest, skipping SHA256 verification"),
        }

        tracing::info!("DMG download completed, mounting and installing");

        let mounter = Arc::clone(&self.mounter);
        let options = self.options.clone();
        let installed = tokio::task::spawn_blocking(move || {
            install_from_image(mounter.as_ref(), &image.path, &options)
        })
        .await
        .map_err(|e| UpdateError::Io(format!("install task failed: {e}")))??;

        tracing::info!("Update installed at {}", installed.bundle_path.display());

        let cleanup = installed
            .backup
            .clone()
            .map(|backup| spawn_backup_removal(backup, self.options.backup_grace));
        let relaunch = self.spawn_relaunch(installed.bundle_path.clone(), cleanup, guard);

        Ok(InstallOutcome {
            bundle_path: installed.bundle_path,
            strategy: installed.strategy,
            backup: installed.backup,
            relaunch,
        })
    }

    fn spawn_relaunch(
        &self,
        bundle: PathBuf,
        cleanup: Option<JoinHandle<()>>,
        guard: InFlightGuard,
    ) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let relauncher = Arc::clone(&self.relauncher);
        let delay = self.options.relaunch_delay;

        tokio::spawn(async move {
            // Backup goes first; the old process exits right after launch.
            if let Some(cleanup) = cleanup {
                let _ = cleanup.await;
            }
            tokio::time::sleep(delay).await;

            let launcher = Arc::clone(&relauncher);
            let launched = tokio::task::spawn_blocking(move || launcher.launch(&bundle))
                .await
                .unwrap_or_else(|e| Err(UpdateError::Relaunch(e.to_string())));

            match &launched {
                Ok(()) => relauncher.terminate(),
                Err(e) => tracing::warn!("Failed to restart application automatically: {e}"),
            }
            drop(guard);
            let _ = tx.send(launched);
        });

        rx
    }
}

struct InstalledBundle {
    bundle_path: PathBuf,
    strategy: SwapStrategy,
    backup: Option<PathBuf>,
}

/// Mounts the image, swaps the bundle and detaches. Blocking.
fn install_from_image(
    mounter: &dyn DiskImageMounter,
    image: &Path,
    options: &InstallerOptions,
) -> Result<InstalledBundle> {
    let mounted = MountedImage::attach(mounter, image)?;
    let source = find_new_bundle(mounted.path(), &options.bundle_name)?;

    let executable = match &options.executable {
        Some(path) => Some(path.clone()),
        None => std::env::current_exe().ok(),
    };
    let dest = locate_installed_bundle(executable.as_deref(), &options.fallback_bundle_paths)?;

    tracing::info!(
        current_app = %dest.display(),
        new_app = %source.display(),
        "Installing update"
    );
    let outcome = swap_bundle(&source, &dest, options.staging_dir.as_deref())?;

    Ok(InstalledBundle {
        bundle_path: dest,
        strategy: outcome.strategy,
        backup: outcome.backup,
    })
}

fn spawn_backup_removal(backup: PathBuf, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let path = backup.clone();
        match tokio::task::spawn_blocking(move || remove_backup(&path)).await {
            Ok(Ok(())) => tracing::info!("Backup cleaned up successfully"),
            Ok(Err(e)) => tracing::warn!("Failed to clean up backup {}: {e}", backup.display()),
            Err(e) => tracing::warn!("Backup cleanup task failed: {e}"),
        }
    })
}

/// Marks an installation as running until dropped.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| UpdateError::Busy)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
