//! Individual stages of an installation.
//!
//! Each stage is a separate module; [`UpdateInstaller`](crate::UpdateInstaller)
//! runs them in order.

pub mod bundle;
pub mod download;
pub mod mount;
pub mod relaunch;
pub mod swap;
pub mod verify;
