//! Starting the installed version and leaving the running one.

use std::path::Path;
use std::process::Command;

use crate::error::{Result, UpdateError};

/// Starts the new bundle and ends the current process.
pub trait Relauncher: Send + Sync {
    /// Starts the application at `bundle`.
    fn launch(&self, bundle: &Path) -> Result<()>;

    /// Ends the running (old) process. Only called after a successful launch.
    fn terminate(&self);
}

/// Launches with the system `open` command and exits with status 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApplication;

impl Relauncher for OpenApplication {
    fn launch(&self, bundle: &Path) -> Result<()> {
        tracing::info!("Relaunching application: {}", bundle.display());

        Command::new("open")
            .arg(bundle)
            .spawn()
            .map_err(|e| UpdateError::Relaunch(e.to_string()))?;

        tracing::info!("Application relaunch command sent");
        Ok(())
    }

    fn terminate(&self) {
        tracing::info!("Exiting current version");
        std::process::exit(0);
    }
}
