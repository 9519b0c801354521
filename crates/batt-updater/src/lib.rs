//! Self-update for the batt menu-bar application.
//!
//! This crate checks GitHub releases for a newer version of batt, schedules
//! those checks, and installs a new version from its disk image.
//!
//! # Overview
//!
//! - [`ReleaseChecker`] fetches the latest release and compares tags. It
//!   caches the last result and when it was fetched.
//! - [`UpdateScheduler`] runs a check at start and then every 24 hours,
//!   reporting newer versions to an [`UpdateListener`].
//! - [`UpdateInstaller`] downloads the installer image, swaps the installed
//!   `.app` bundle with rollback on failure, and relaunches the new version.
//!
//! All network requests go through the proxy returned by a
//! [`ProxyResolver`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use batt_updater::{
//!     CURRENT_VERSION, ChannelListener, InstallerOptions, UpdateInstaller, UpdateScheduler,
//!     UpdaterConfig,
//! };
//!
//! async fn run() -> batt_updater::Result<()> {
//!     let config = UpdaterConfig::default();
//!     let scheduler =
//!         UpdateScheduler::from_config(CURRENT_VERSION, &config, config.proxy_resolver())?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     scheduler.set_listener(ChannelListener(tx));
//!     scheduler.start();
//!
//!     if let Some(info) = rx.recv().await {
//!         let installer =
//!             UpdateInstaller::new(InstallerOptions::from_config(&config), config.proxy_resolver())?;
//!         let outcome = installer.download_and_install(&info).await?;
//!         println!("Installed to {}", outcome.bundle_path.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod error;
pub mod proxy;
pub mod release;
pub mod version;

// GitHub API
pub mod github;

// Checking and scheduling
pub mod checker;
pub mod scheduler;

// Installation
pub mod installer;
pub mod steps;

// Re-export main types for convenience
pub use checker::ReleaseChecker;
pub use config::UpdaterConfig;
pub use error::{Result, UpdateError};
pub use installer::{InstallOutcome, InstallerOptions, UpdateInstaller};
pub use proxy::{NoProxy, ProxyEndpoint, ProxyResolver, SystemProxy};
pub use release::{UpdateAvailability, UpdateInfo, format_download_size};
pub use scheduler::{ChannelListener, UpdateListener, UpdateScheduler};
pub use steps::download::DownloadProgress;
pub use steps::mount::{DiskImageMounter, Hdiutil};
pub use steps::relaunch::{OpenApplication, Relauncher};
pub use steps::swap::SwapStrategy;
pub use version::{CURRENT_VERSION, is_newer_version};
