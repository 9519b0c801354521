//! Version comparison for release tags.
//!
//! Tags are compared as plain strings after removing a leading `v`. This is
//! not semver-aware: `"1.10.0"` sorts before `"1.9.0"`, so a `v1.10.0`
//! release is not offered to a `v1.9.0` installation. Release tags must stay
//! lexicographically increasing for updates to be detected.

/// Current version of the application, as a release tag.
pub const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Removes a single leading `v` from a version tag.
#[must_use]
pub fn strip_version_prefix(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Returns `true` if `latest` is newer than `current`.
///
/// Both strings are compared with plain string ordering after
/// [`strip_version_prefix`].
#[must_use]
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    let latest = strip_version_prefix(latest);
    let current = strip_version_prefix(current);

    latest != current && latest > current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_version_prefix() {
        assert_eq!(strip_version_prefix("v1.2.3"), "1.2.3");
        assert_eq!(strip_version_prefix("1.2.3"), "1.2.3");
        assert_eq!(strip_version_prefix("vv1"), "v1");
        assert_eq!(strip_version_prefix(""), "");
    }

    #[test]
    fn test_newer_version() {
        assert!(is_newer_version("v1.1.0", "v1.0.0"));
        assert!(is_newer_version("v2.0.0", "v1.9.9"));
        assert!(is_newer_version("1.0.1", "v1.0.0"));
        assert!(is_newer_version("v0.5.0", "0.4.9"));
    }

    #[test]
    fn test_same_or_older_version() {
        assert!(!is_newer_version("v1.0.0", "v1.0.0"));
        assert!(!is_newer_version("v1.0.0", "1.0.0"));
        assert!(!is_newer_version("v1.0.0", "v1.1.0"));
        assert!(!is_newer_version("", ""));
    }

    #[test]
    fn test_string_ordering_inversion() {
        // Plain string ordering: "1.10.0" < "1.9.0".
        assert!(!is_newer_version("v1.10.0", "v1.9.0"));
        assert!(is_newer_version("v1.9.0", "v1.10.0"));
    }

    #[test]
    fn test_matches_string_ordering() {
        let tags = [
            "v0.1.0", "v0.9.0", "v0.10.0", "v1.0.0", "1.0.0", "v1.0.0-beta", "v2", "",
        ];
        for a in tags {
            for b in tags {
                let (sa, sb) = (strip_version_prefix(a), strip_version_prefix(b));
                assert_eq!(is_newer_version(a, b), sa != sb && sa > sb, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_current_version_has_prefix() {
        assert!(CURRENT_VERSION.starts_with('v'));
        assert!(!is_newer_version(CURRENT_VERSION, CURRENT_VERSION));
    }
}
