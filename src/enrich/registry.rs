//! npm registry version resolution.
//!
//! Maps a detected display name to its canonical registry identity and
//! compares the scanned version against the latest published version.

use crate::types::{Result, VersionDiff, UNKNOWN_VERSION};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// npm registry API response for package info.
#[derive(Debug, Deserialize)]
struct NpmPackageInfo {
    #[serde(rename = "dist-tags")]
    dist_tags: Option<DistTags>,
}

#[derive(Debug, Deserialize)]
struct DistTags {
    latest: Option<String>,
}

/// Display-name to registry-identity mapping.
///
/// Covers libraries whose public display name differs from the package's
/// registry identity, most notably the AngularJS -> Angular rebrand where
/// the successor publishes under a scope. Constructed once at startup and
/// shared by reference.
#[derive(Debug)]
pub struct AliasTable {
    map: HashMap<String, String>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let entries: &[(&str, &str)] = &[
            ("angularjs", "angular"),
            ("angular", "@angular/core"),
            ("ember", "ember-source"),
            ("d3", "d3"),
            ("jquery", "jquery"),
            ("mustache", "mustache"),
            ("knockout", "knockout"),
            ("dojo", "dojo"),
        ];

        Self {
            map: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Canonical registry identity for a display name; names without an
    /// alias map to their lowercase form.
    pub fn canonical(&self, display_name: &str) -> String {
        let key = display_name.to_lowercase();
        self.map.get(&key).cloned().unwrap_or(key)
    }
}

/// Outcome of a latest-version lookup.
#[derive(Debug, Clone)]
pub struct VersionStatus {
    pub registry_name: String,
    pub latest_version: Option<String>,
    pub is_outdated: Option<bool>,
    pub version_diff: VersionDiff,
}

impl VersionStatus {
    /// Status when the registry could not be consulted.
    pub fn unavailable(registry_name: String) -> Self {
        Self {
            registry_name,
            latest_version: None,
            is_outdated: None,
            version_diff: VersionDiff::Unknown,
        }
    }
}

/// Resolver for latest published versions on the npm registry.
pub struct VersionResolver {
    client: Client,
    aliases: Arc<AliasTable>,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    registry_url: String,
}

impl VersionResolver {
    pub fn new(timeout_secs: u64, rate_limit: u32, aliases: Arc<AliasTable>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("libscout/0.1")
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let quota =
            Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::new(5).unwrap()));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            aliases,
            rate_limiter,
            registry_url: "https://registry.npmjs.org".to_string(),
        })
    }

    /// Resolve the latest version for a display name and compare it against
    /// the scanned version. Never errors; failures degrade to an
    /// [`VersionStatus::unavailable`] result.
    pub async fn resolve(&self, display_name: &str, scanned_version: &str) -> VersionStatus {
        let registry_name = self.aliases.canonical(display_name);

        self.rate_limiter.until_ready().await;

        let Some(latest) = self.fetch_latest(&registry_name).await else {
            return VersionStatus::unavailable(registry_name);
        };

        // The sentinel never participates in comparison.
        if scanned_version == UNKNOWN_VERSION {
            return VersionStatus {
                registry_name,
                latest_version: Some(latest),
                is_outdated: None,
                version_diff: VersionDiff::Unknown,
            };
        }

        let diff = compare_versions(scanned_version, &latest);
        let outdated = normalize_version(scanned_version) < normalize_version(&latest);

        VersionStatus {
            registry_name,
            latest_version: Some(latest),
            is_outdated: Some(outdated),
            version_diff: diff,
        }
    }

    /// Fetch `dist-tags.latest` for a registry identity.
    async fn fetch_latest(&self, registry_name: &str) -> Option<String> {
        let url = format!(
            "{}/{}",
            self.registry_url,
            urlencoding::encode(registry_name)
        );
        trace!("Fetching latest version: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Registry fetch failed for {}: {}", registry_name, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(
                "Registry returned {} for {}",
                response.status(),
                registry_name
            );
            return None;
        }

        match response.json::<NpmPackageInfo>().await {
            Ok(info) => info.dist_tags.and_then(|dt| dt.latest),
            Err(e) => {
                warn!("Malformed registry response for {}: {}", registry_name, e);
                None
            }
        }
    }
}

/// Normalize a version string to a (major, minor, patch) tuple by taking the
/// first 1-3 dotted numeric components found anywhere in the string and
/// zero-filling the rest. Strings with no numeric content normalize to
/// (0, 0, 0).
pub fn normalize_version(version: &str) -> (u64, u64, u64) {
    let token = match regex::Regex::new(r"\d+(?:\.\d+){0,2}") {
        Ok(re) => re,
        Err(_) => return (0, 0, 0),
    };

    let Some(m) = token.find(version) else {
        return (0, 0, 0);
    };

    let mut parts = m.as_str().split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Classify how far `scanned` lags `latest`: the most significant differing
/// component, or `none` when equal or scanned is at least as new.
pub fn compare_versions(scanned: &str, latest: &str) -> VersionDiff {
    let s = normalize_version(scanned);
    let l = normalize_version(latest);

    if s >= l {
        return VersionDiff::None;
    }

    if s.0 != l.0 {
        VersionDiff::Major
    } else if s.1 != l.1 {
        VersionDiff::Minor
    } else {
        VersionDiff::Patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_versions() {
        assert_eq!(normalize_version("1.2.3"), (1, 2, 3));
        assert_eq!(normalize_version("1.2"), (1, 2, 0));
        assert_eq!(normalize_version("7"), (7, 0, 0));
    }

    #[test]
    fn test_normalize_finds_token_anywhere() {
        assert_eq!(normalize_version("v1.2.3-beta.4"), (1, 2, 3));
        assert_eq!(normalize_version("release-2.9"), (2, 9, 0));
    }

    #[test]
    fn test_normalize_garbage_to_zero() {
        assert_eq!(normalize_version("unknown"), (0, 0, 0));
        assert_eq!(normalize_version(""), (0, 0, 0));
        assert_eq!(normalize_version("latest"), (0, 0, 0));
    }

    #[test]
    fn test_compare_equal_is_none() {
        assert_eq!(compare_versions("1.2.3", "1.2.3"), VersionDiff::None);
    }

    #[test]
    fn test_compare_patch() {
        assert_eq!(compare_versions("1.2.3", "1.2.9"), VersionDiff::Patch);
    }

    #[test]
    fn test_compare_minor() {
        assert_eq!(compare_versions("1.2.3", "1.3.0"), VersionDiff::Minor);
    }

    #[test]
    fn test_compare_major() {
        assert_eq!(compare_versions("1.2.3", "2.0.0"), VersionDiff::Major);
    }

    #[test]
    fn test_compare_newer_than_latest_is_none() {
        assert_eq!(compare_versions("3.0.0", "2.9.9"), VersionDiff::None);
    }

    #[test]
    fn test_alias_rebrand_changes_registry_identity() {
        let aliases = AliasTable::builtin();
        assert_eq!(aliases.canonical("AngularJS"), "angular");
        assert_eq!(aliases.canonical("Angular"), "@angular/core");
    }

    #[test]
    fn test_alias_default_is_lowercase_passthrough() {
        let aliases = AliasTable::builtin();
        assert_eq!(aliases.canonical("Lodash"), "lodash");
        assert_eq!(aliases.canonical("React"), "react");
    }

    #[test]
    fn test_unavailable_status() {
        let status = VersionStatus::unavailable("lodash".to_string());
        assert!(status.latest_version.is_none());
        assert!(status.is_outdated.is_none());
        assert_eq!(status.version_diff, VersionDiff::Unknown);
    }
}
