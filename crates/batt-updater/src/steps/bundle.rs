//! Locating application bundles.

use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// Directory suffix of application bundles.
pub const BUNDLE_EXTENSION: &str = "app";

/// Returns the new bundle at the root of a mounted image.
pub fn find_new_bundle(mount_point: &Path, bundle_name: &str) -> Result<PathBuf> {
    let bundle = mount_point.join(bundle_name);
    if bundle.is_dir() {
        tracing::info!("Found app bundle: {}", bundle.display());
        return Ok(bundle);
    }

    let contents: Vec<String> = std::fs::read_dir(mount_point)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    tracing::error!("App bundle '{bundle_name}' not found. DMG contains: {contents:?}");

    Err(UpdateError::BundleNotFound(format!(
        "{bundle_name} not in mounted DMG at {}",
        mount_point.display()
    )))
}

/// Walks up from `executable` to the enclosing `.app` directory.
///
/// Typical path: /Applications/batt.app/Contents/MacOS/batt
#[must_use]
pub fn find_enclosing_bundle(executable: &Path) -> Option<PathBuf> {
    executable
        .ancestors()
        .skip(1)
        .find(|dir| dir.extension().is_some_and(|ext| ext == BUNDLE_EXTENSION) && dir.is_dir())
        .map(Path::to_path_buf)
}

/// Finds the installed bundle to replace.
///
/// Tries the bundle enclosing `executable`, then the first existing
/// `fallbacks` entry.
pub fn locate_installed_bundle(executable: Option<&Path>, fallbacks: &[PathBuf]) -> Result<PathBuf> {
    if let Some(exe) = executable {
        tracing::debug!("Current executable path: {}", exe.display());
        if let Some(bundle) = find_enclosing_bundle(exe) {
            return Ok(bundle);
        }
        tracing::warn!("Not running from an app bundle: {}", exe.display());
    }

    fallbacks
        .iter()
        .find(|path| path.is_dir())
        .cloned()
        .ok_or_else(|| {
            UpdateError::BundleNotFound(format!(
                "current app not found (tried {})",
                fallbacks
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}
