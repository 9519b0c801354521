//! Bundle swap with rollback support.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// Suffix appended to the installed bundle path while an update is in place.
pub const BACKUP_SUFFIX: &str = ".backup";

/// How the new bundle reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStrategy {
    /// Backed up in place, then copied straight from the image.
    Direct,
    /// Copied to a scratch directory first, then renamed into place.
    TempStaging,
}

/// Result of a successful bundle swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Which strategy completed the swap.
    pub strategy: SwapStrategy,
    /// The previous bundle, if it could be kept.
    pub backup: Option<PathBuf>,
}

/// Why the direct strategy gave up.
#[derive(Debug)]
enum DirectFailure {
    /// The destination still holds the previous bundle.
    Intact(String),
    /// The destination could not be restored.
    Damaged(String),
}

/// Filesystem operations a swap performs on whole bundles.
trait BundleFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn copy_dir(&self, src: &Path, dst: &Path) -> io::Result<()> {
        copy_dir(src, dst)
    }
}

/// The real filesystem.
struct StdFs;

impl BundleFs for StdFs {}

/// Returns `<dest>.backup`.
#[must_use]
pub fn backup_path(dest: &Path) -> PathBuf {
    let mut path = OsString::from(dest.as_os_str());
    path.push(BACKUP_SUFFIX);
    PathBuf::from(path)
}

/// Replaces the bundle at `dest` with a copy of `source`.
///
/// Tries the direct strategy first. If that fails with the previous bundle
/// still in place, retries through a scratch directory under `staging_root`
/// (the system temp dir when `None`). When both fail the error names both
/// causes.
pub fn swap_bundle(source: &Path, dest: &Path, staging_root: Option<&Path>) -> Result<SwapOutcome> {
    swap_bundle_with(&StdFs, source, dest, staging_root)
}

fn swap_bundle_with(
    bfs: &dyn BundleFs,
    source: &Path,
    dest: &Path,
    staging_root: Option<&Path>,
) -> Result<SwapOutcome> {
    tracing::info!("Swapping bundles: {} -> {}", source.display(), dest.display());

    match swap_direct(bfs, source, dest) {
        Ok(backup) => Ok(SwapOutcome {
            strategy: SwapStrategy::Direct,
            backup,
        }),
        Err(DirectFailure::Damaged(reason)) => Err(UpdateError::Swap(reason)),
        Err(DirectFailure::Intact(direct)) => {
            tracing::warn!("Direct copy failed ({direct}), trying temp directory approach");
            match swap_with_staging(bfs, source, dest, staging_root) {
                Ok(backup) => Ok(SwapOutcome {
                    strategy: SwapStrategy::TempStaging,
                    backup: Some(backup),
                }),
                Err(staged) => Err(UpdateError::Swap(format!(
                    "direct copy failed: {direct}; temp directory copy failed: {staged}"
                ))),
            }
        }
    }
}

fn swap_direct(
    bfs: &dyn BundleFs,
    source: &Path,
    dest: &Path,
) -> std::result::Result<Option<PathBuf>, DirectFailure> {
    let backup = backup_path(dest);
    remove_stale_backup(bfs, &backup).map_err(DirectFailure::Intact)?;

    let backup = match bfs.rename(dest, &backup) {
        Ok(()) => {
            tracing::info!("Current app moved to backup: {}", backup.display());
            Some(backup)
        }
        Err(e) => {
            tracing::warn!("Failed to back up current app ({e}), removing it instead");
            // A partial removal leaves no usable copy of the current app.
            bfs.remove_dir_all(dest)
                .map_err(|e| DirectFailure::Damaged(format!("failed to remove current app: {e}")))?;
            None
        }
    };

    if let Err(e) = bfs.copy_dir(source, dest) {
        let reason = format!("failed to copy new app: {e}");
        return match &backup {
            Some(backup) => match restore_with(bfs, backup, dest) {
                Ok(()) => Err(DirectFailure::Intact(reason)),
                Err(restore) => {
                    tracing::error!("Failed to restore backup: {restore}");
                    Err(DirectFailure::Damaged(format!(
                        "{reason}; restoring backup also failed: {restore}"
                    )))
                }
            },
            None => Err(DirectFailure::Damaged(reason)),
        };
    }

    tracing::info!("New app installed: {}", dest.display());
    Ok(backup)
}

fn swap_with_staging(
    bfs: &dyn BundleFs,
    source: &Path,
    dest: &Path,
    staging_root: Option<&Path>,
) -> std::result::Result<PathBuf, String> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("batt-update-");
    let scratch = match staging_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(|e| format!("failed to create temp directory: {e}"))?;

    let name = dest
        .file_name()
        .ok_or_else(|| format!("invalid app path: {}", dest.display()))?;
    let staged = scratch.path().join(name);
    bfs.copy_dir(source, &staged)
        .map_err(|e| format!("failed to copy to temp location: {e}"))?;

    let backup = backup_path(dest);
    remove_stale_backup(bfs, &backup)?;
    bfs.rename(dest, &backup)
        .map_err(|e| format!("failed to back up current app: {e}"))?;

    if let Err(e) = bfs.rename(&staged, dest) {
        if let Err(restore) = bfs.rename(&backup, dest) {
            tracing::error!("Failed to restore backup: {restore}");
        }
        return Err(format!("failed to move new app into place: {e}"));
    }

    tracing::info!("New app installed via temp directory: {}", dest.display());
    Ok(backup)
}

fn remove_stale_backup(bfs: &dyn BundleFs, backup: &Path) -> std::result::Result<(), String> {
    if fs::symlink_metadata(backup).is_ok() {
        tracing::info!("Removing old backup: {}", backup.display());
        bfs.remove_dir_all(backup)
            .map_err(|e| format!("failed to remove old backup: {e}"))?;
    }
    Ok(())
}

/// Puts `backup` back at `dest`, discarding whatever is there.
pub fn restore_backup(backup: &Path, dest: &Path) -> io::Result<()> {
    restore_with(&StdFs, backup, dest)
}

fn restore_with(bfs: &dyn BundleFs, backup: &Path, dest: &Path) -> io::Result<()> {
    tracing::info!("Rolling back to {}", backup.display());
    if fs::symlink_metadata(dest).is_ok() {
        bfs.remove_dir_all(dest)?;
    }
    bfs.rename(backup, dest)?;
    tracing::info!("Rollback complete");
    Ok(())
}

/// Deletes a backup left by a finished swap.
pub fn remove_backup(backup: &Path) -> io::Result<()> {
    tracing::info!("Cleaning up backup: {}", backup.display());
    fs::remove_dir_all(backup)
}

/// Recursively copies `src` into `dst`, keeping permission bits and
/// symbolic links.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let permissions = fs::metadata(src)?.permissions();
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }

    // Applied last so read-only directories can still be filled.
    fs::set_permissions(dst, permissions)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
