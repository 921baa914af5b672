//! Core types and errors for the library scanner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during scanning.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, ScoutError>;

/// Sentinel version for libraries detected without a concrete version.
/// Never compared as a real version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Locator used for candidates discovered via runtime introspection,
/// where no single URL identifies the evidence.
pub const RUNTIME_LOCATOR: &str = "runtime";

/// Which detection signal produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    /// Regex match against a script URL.
    StaticUrl,
    /// Runtime global / DOM attribute probe in a headless browser.
    Runtime,
    /// Signature-database filename pattern.
    SignatureFile,
    /// Signature-database content pattern against the fetched body.
    SignatureContent,
}

/// A library detection produced by one of the detectors.
///
/// Immutable once created; the merge step picks between candidates,
/// it never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryCandidate {
    /// Display name (e.g. "jQuery").
    pub name: String,
    /// Dotted-numeric version string, or [`UNKNOWN_VERSION`].
    pub version: String,
    /// Detection signal that produced this candidate.
    pub source: DetectionSource,
    /// Originating URL, or [`RUNTIME_LOCATOR`].
    pub locator: String,
}

impl LibraryCandidate {
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        source: DetectionSource,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            source,
            locator: locator.into(),
        }
    }

    /// Whether this candidate carries a concrete version.
    pub fn has_version(&self) -> bool {
        self.version != UNKNOWN_VERSION
    }
}

/// Classification of how far a scanned version lags the latest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VersionDiff {
    None,
    Patch,
    Minor,
    Major,
    Unknown,
}

/// A known vulnerability affecting a detected library version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vulnerability {
    /// CVE-style alias when available, else the database's native id.
    pub id: String,
    /// All CVE-prefixed aliases of the advisory.
    pub cve_ids: Vec<String>,
    /// Highest-numeric CVSS score as "<scheme>:<score>", or a categorical fallback.
    pub severity: String,
    /// Free-text description.
    pub summary: String,
}

/// A merged library candidate with version-freshness and vulnerability data
/// attached. Enrichment failures null the enrichment fields; they never
/// remove the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedLibrary {
    pub name: String,
    pub version: String,
    pub source: DetectionSource,
    pub locator: String,
    /// Canonical package identity used for registry and vulnerability queries.
    pub registry_name: String,
    pub latest_version: Option<String>,
    pub is_outdated: Option<bool>,
    pub version_diff: VersionDiff,
    pub vulnerability_count: Option<usize>,
    /// At most five entries, in the order the database returned them.
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Peer-certificate expiry data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsExpiry {
    pub valid_to: String,
    pub days_left: i64,
}

/// Complete scan report for a target page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub target_url: String,
    /// Header name -> value, or "missing" when the response lacks it.
    pub security_headers: BTreeMap<String, String>,
    pub libraries: Vec<EnrichedLibrary>,
    pub tls_expiry: Option<TlsExpiry>,
    pub duration_ms: u64,
}

/// Configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (compatible; libscout/0.1)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_version_sentinel() {
        let with = LibraryCandidate::new(
            "jQuery",
            Some("3.5.1".to_string()),
            DetectionSource::StaticUrl,
            "https://example.com/jquery-3.5.1.min.js",
        );
        assert!(with.has_version());

        let without =
            LibraryCandidate::new("jQuery", None, DetectionSource::Runtime, RUNTIME_LOCATOR);
        assert!(!without.has_version());
        assert_eq!(without.version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&DetectionSource::StaticUrl).unwrap();
        assert_eq!(json, "\"static-url\"");
        let json = serde_json::to_string(&DetectionSource::SignatureContent).unwrap();
        assert_eq!(json, "\"signature-content\"");
    }

    #[test]
    fn test_version_diff_serialization() {
        let json = serde_json::to_string(&VersionDiff::Major).unwrap();
        assert_eq!(json, "\"major\"");
    }
}
