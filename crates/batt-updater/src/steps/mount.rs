//! Attaching and detaching disk images.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, UpdateError};

/// Volume root prefix that `hdiutil attach` reports mounts under.
const VOLUMES_PREFIX: &str = "/Volumes/";

/// Mounts and unmounts disk images.
pub trait DiskImageMounter: Send + Sync {
    /// Attaches `image` read-only and returns its mount point.
    fn attach(&self, image: &Path) -> Result<PathBuf>;

    /// Detaches the volume at `mount_point`.
    fn detach(&self, mount_point: &Path) -> Result<()>;
}

/// Mounts images with the system `hdiutil` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdiutil;

impl DiskImageMounter for Hdiutil {
    fn attach(&self, image: &Path) -> Result<PathBuf> {
        // No Finder window, no checksum pass over the image.
        let output = Command::new("hdiutil")
            .args(["attach", "-nobrowse", "-noverify"])
            .arg(image)
            .output()
            .map_err(|e| UpdateError::Mount(format!("failed to run hdiutil: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("hdiutil attach failed: {}", stderr);
            return Err(UpdateError::Mount(format!(
                "hdiutil attach exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_mount_point(&stdout).ok_or_else(|| {
            UpdateError::Mount(format!("could not find mount point in hdiutil output: {stdout}"))
        })
    }

    fn detach(&self, mount_point: &Path) -> Result<()> {
        let output = Command::new("hdiutil")
            .arg("detach")
            .arg(mount_point)
            .output()
            .map_err(|e| UpdateError::Unmount(format!("failed to run hdiutil: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(UpdateError::Unmount(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Extracts the mount point from `hdiutil attach` output.
///
/// The output is a table of device, partition type and mount point separated
/// by tabs; only the data partition line has a mount point. Volume names may
/// contain spaces, so everything from `/Volumes/` to the end of the line is
/// taken.
#[must_use]
pub fn parse_mount_point(output: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        line.find(VOLUMES_PREFIX)
            .map(|start| PathBuf::from(line[start..].trim()))
    })
}

/// An attached image. Detaches on drop.
pub struct MountedImage<'a> {
    mounter: &'a dyn DiskImageMounter,
    mount_point: PathBuf,
}

impl<'a> MountedImage<'a> {
    /// Attaches `image` with `mounter`.
    pub fn attach(mounter: &'a dyn DiskImageMounter, image: &Path) -> Result<Self> {
        tracing::info!("Mounting DMG file: {}", image.display());
        let mount_point = mounter.attach(image)?;
        tracing::info!("DMG mounted at: {}", mount_point.display());

        Ok(Self {
            mounter,
            mount_point,
        })
    }

    /// Root of the mounted volume.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.mount_point
    }
}

impl Drop for MountedImage<'_> {
    fn drop(&mut self) {
        tracing::debug!("Detaching DMG at {}", self.mount_point.display());
        if let Err(e) = self.mounter.detach(&self.mount_point) {
            tracing::warn!("Failed to unmount DMG: {e}");
        }
    }
}
