//! Release version detection.
//!
//! The version is derived from CI environment variables, in order:
//! explicit override, Gerrit tags, GitHub release tags, Jenkins build
//! numbers and finally the short hash of the current commit.

use std::process::Command;

use chrono::{Local, NaiveDate};
use tracing::debug;

/// Environment variable that overrides every other version source.
pub const VERSION_OVERRIDE_VAR: &str = "KEEL_VERSION";

/// Computed release version and its image-tag-safe variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub image_tag: String,
}

impl ReleaseInfo {
    /// Build from a known version string.
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let image_tag = image_tag(&version);
        Self { version, image_tag }
    }

    /// Detect the version from the process environment and the git checkout.
    pub fn detect() -> Self {
        let today = Local::now().date_naive();
        Self::detect_with(|name| std::env::var(name).ok(), today).unwrap_or_else(|| {
            debug!("No CI version variables found, using last commit hash");
            Self::new(last_commit_hash().unwrap_or_default())
        })
    }

    /// Detect the version from CI variables only.
    ///
    /// Returns `None` when no CI source applies, leaving the git fallback
    /// to the caller.
    pub fn detect_with<F>(lookup: F, today: NaiveDate) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(version) = var(VERSION_OVERRIDE_VAR) {
            return Some(Self::new(version));
        }

        if let Some(refname) = var("GERRIT_REFNAME") {
            if refname != "master" {
                return Some(Self::new(last_segment(&refname)));
            }
        }

        if let Some(reference) = var("GITHUB_REF") {
            if reference.starts_with("refs/tags/") {
                return Some(Self::new(last_segment(&reference)));
            }
        }

        if let Some(build) = var("BUILD_NUMBER") {
            let date = today.format("%Y%m%d");
            let version = if var("GERRIT_EVENT_TYPE").as_deref() == Some("patchset-created") {
                format!(
                    "{}.{}.0-preview.{}.{}",
                    date,
                    build,
                    var("GERRIT_CHANGE_NUMBER").unwrap_or_default(),
                    var("GERRIT_PATCHSET_NUMBER").unwrap_or_default()
                )
            } else {
                let rev = var("GERRIT_NEWREV").unwrap_or_default();
                format!("{}.{}.0+{}", date, build, short_hash(&rev))
            };
            return Some(Self::new(version));
        }

        None
    }
}

/// Image registries reject `+`, so build metadata is joined with `-`.
pub fn image_tag(version: &str) -> String {
    version.replacen('+', "-", 1)
}

fn last_segment(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

fn last_commit_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout);
    Some(short_hash(hash.trim()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn detect(vars: &[(&str, &str)]) -> Option<ReleaseInfo> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        ReleaseInfo::detect_with(|name| env.get(name).cloned(), today)
    }

    #[test]
    fn test_override_wins() {
        let info = detect(&[(VERSION_OVERRIDE_VAR, "1.2.3"), ("GITHUB_REF", "refs/tags/v9")]).unwrap();
        assert_eq!(info.version, "1.2.3");
    }

    #[test]
    fn test_gerrit_refname() {
        assert_eq!(detect(&[("GERRIT_REFNAME", "refs/tags/v2.0.0")]).unwrap().version, "v2.0.0");
        assert!(detect(&[("GERRIT_REFNAME", "master")]).is_none());
    }

    #[test]
    fn test_github_tags_only() {
        assert_eq!(detect(&[("GITHUB_REF", "refs/tags/v1.4.0")]).unwrap().version, "v1.4.0");
        assert!(detect(&[("GITHUB_REF", "refs/heads/main")]).is_none());
    }

    #[test]
    fn test_jenkins_build() {
        let info = detect(&[("BUILD_NUMBER", "42"), ("GERRIT_NEWREV", "abcdef0123456")]).unwrap();
        assert_eq!(info.version, "20240309.42.0+abcdef0");
        assert_eq!(info.image_tag, "20240309.42.0-abcdef0");
    }

    #[test]
    fn test_jenkins_preview() {
        let info = detect(&[
            ("BUILD_NUMBER", "7"),
            ("GERRIT_EVENT_TYPE", "patchset-created"),
            ("GERRIT_CHANGE_NUMBER", "1234"),
            ("GERRIT_PATCHSET_NUMBER", "3"),
        ])
        .unwrap();
        assert_eq!(info.version, "20240309.7.0-preview.1234.3");
    }

    #[test]
    fn test_image_tag_replaces_first_plus() {
        assert_eq!(image_tag("1.0.0+a+b"), "1.0.0-a+b");
        assert_eq!(image_tag("1.0.0"), "1.0.0");
    }
}
