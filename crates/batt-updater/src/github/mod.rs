//! GitHub release feed client and types.

pub mod client;
pub mod types;

pub use client::{FEED_TIMEOUT, GitHubClient};
pub use types::{GitHubAsset, GitHubRelease, INSTALLER_EXTENSION};
