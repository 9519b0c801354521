use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{info, warn};

use batt_updater::{
    ChannelListener, InstallerOptions, ReleaseChecker, Relauncher, UpdateAvailability,
    UpdateInfo, UpdateInstaller, UpdateScheduler, UpdaterConfig,
};

use crate::cli::{CheckArgs, InstallArgs, WatchArgs};
use crate::config::render_config;

/// Leaves the old process running and launches nothing.
struct SkipRelaunch;

impl Relauncher for SkipRelaunch {
    fn launch(&self, bundle: &Path) -> batt_updater::Result<()> {
        info!("Relaunch skipped, start {} manually", bundle.display());
        Ok(())
    }

    fn terminate(&self) {}
}

pub async fn run_check(config: &UpdaterConfig, current_version: &str, args: &CheckArgs) -> Result<()> {
    let checker = ReleaseChecker::new(current_version, config, config.proxy_resolver())?;

    let Some(info) = checker.check_for_update().await? else {
        println!("No stable release newer than {current_version}");
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(info.as_ref())?);
    } else {
        print_update(&info);
    }
    Ok(())
}

pub async fn run_install(
    config: &UpdaterConfig,
    current_version: &str,
    args: &InstallArgs,
) -> Result<()> {
    let checker = ReleaseChecker::new(current_version, config, config.proxy_resolver())?;
    let Some(info) = checker.check_for_update().await? else {
        println!("batt is up to date");
        return Ok(());
    };

    print_update(&info);
    if info.availability() != UpdateAvailability::Installable {
        return Ok(());
    }

    if !args.yes && !confirm("Install now?")? {
        println!("Installation cancelled");
        return Ok(());
    }

    let mut options = InstallerOptions::from_config(config);
    options.staging_dir.clone_from(&args.staging_dir);
    let relauncher: Option<Arc<dyn Relauncher>> = if args.no_relaunch {
        Some(Arc::new(SkipRelaunch))
    } else {
        None
    };

    install(config, options, relauncher, &info).await
}

pub async fn run_watch(config: &UpdaterConfig, current_version: &str, args: &WatchArgs) -> Result<()> {
    if !config.enabled {
        bail!("automatic update checks are disabled in the config");
    }

    let scheduler = UpdateScheduler::from_config(current_version, config, config.proxy_resolver())?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    scheduler.set_listener(ChannelListener(tx));
    scheduler.start();

    loop {
        tokio::select! {
            Some(info) = rx.recv() => {
                print_update(&info);
                if args.install && info.is_installable() {
                    scheduler.stop();
                    let options = InstallerOptions::from_config(config);
                    return install(config, options, None, &info).await;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                info!("Interrupted, stopping");
                scheduler.stop();
                return Ok(());
            }
        }
    }
}

pub fn run_config(config: &UpdaterConfig) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

async fn install(
    config: &UpdaterConfig,
    options: InstallerOptions,
    relauncher: Option<Arc<dyn Relauncher>>,
    info: &UpdateInfo,
) -> Result<()> {
    let mut installer = UpdateInstaller::new(options, config.proxy_resolver())?
        .on_progress(|progress| println!("Downloading... {}%", progress.percent));
    if let Some(relauncher) = relauncher {
        installer = installer.with_relauncher(relauncher);
    }

    let outcome = installer
        .download_and_install(info)
        .await
        .with_context(|| format!("install {}", info.latest_version))?;
    println!(
        "Installed {} to {}",
        info.latest_version,
        outcome.bundle_path.display()
    );

    // Backup cleanup finishes before this resolves.
    match outcome.relaunch.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{e}, start {} manually", outcome.bundle_path.display()),
        Err(_) => warn!("Relaunch task ended unexpectedly"),
    }
    Ok(())
}

fn print_update(info: &UpdateInfo) {
    match info.availability() {
        UpdateAvailability::UpToDate => {
            println!("batt {} is up to date", info.current_version);
        }
        UpdateAvailability::ManualDownload { release_url } => {
            println!(
                "Update available: {} -> {}",
                info.current_version, info.latest_version
            );
            println!("No installer attached, download it from {release_url}");
        }
        UpdateAvailability::Installable => {
            println!(
                "Update available: {} -> {} ({})",
                info.current_version,
                info.latest_version,
                info.human_download_size()
            );
            if !info.release_notes.is_empty() {
                println!("\n{}\n", info.release_notes.trim());
            }
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
