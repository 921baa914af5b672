//! OSV.dev vulnerability lookups for package + version pairs.

use crate::types::{Result, Vulnerability, UNKNOWN_VERSION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Cap on vulnerabilities carried per library in the report.
const MAX_VULNERABILITIES: usize = 5;

#[derive(Serialize)]
struct OsvQuery {
    package: OsvPackage,
    version: String,
}

#[derive(Serialize)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Debug, Deserialize)]
struct OsvQueryResponse {
    vulns: Option<Vec<OsvVuln>>,
}

#[derive(Debug, Deserialize)]
struct OsvVuln {
    id: String,
    aliases: Option<Vec<String>>,
    summary: Option<String>,
    details: Option<String>,
    severity: Option<Vec<OsvSeverity>>,
}

#[derive(Debug, Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    severity_type: Option<String>,
    score: Option<String>,
}

/// Result of a vulnerability lookup. A `count` of `None` means the database
/// could not be consulted; zero means it answered with no matches.
#[derive(Debug, Clone, Default)]
pub struct VulnReport {
    pub count: Option<usize>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl VulnReport {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// Resolver querying OSV.dev for known advisories.
pub struct VulnerabilityResolver {
    client: Client,
    api_url: String,
}

impl VulnerabilityResolver {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("libscout/0.1")
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: "https://api.osv.dev/v1/query".to_string(),
        })
    }

    /// Query advisories for a canonical npm identity and scanned version.
    /// Never errors; failures and the "unknown" sentinel both degrade to an
    /// unavailable report.
    pub async fn lookup(&self, registry_name: &str, version: &str) -> VulnReport {
        // Range evaluation needs a concrete version.
        if version == UNKNOWN_VERSION {
            return VulnReport::unavailable();
        }

        let query = OsvQuery {
            package: OsvPackage {
                name: registry_name.to_string(),
                ecosystem: "npm".to_string(),
            },
            version: version.to_string(),
        };

        trace!("Querying OSV for {}@{}", registry_name, version);

        let response = match self.client.post(&self.api_url).json(&query).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("OSV query failed for {}: {}", registry_name, e);
                return VulnReport::unavailable();
            }
        };

        if !response.status().is_success() {
            debug!("OSV returned {} for {}", response.status(), registry_name);
            return VulnReport::unavailable();
        }

        let parsed = match response.json::<OsvQueryResponse>().await {
            Ok(p) => p,
            Err(e) => {
                debug!("Malformed OSV response for {}: {}", registry_name, e);
                return VulnReport::unavailable();
            }
        };

        let vulns = parsed.vulns.unwrap_or_default();
        let count = vulns.len();
        let vulnerabilities = vulns
            .into_iter()
            .take(MAX_VULNERABILITIES)
            .map(reduce_vuln)
            .collect();

        VulnReport {
            count: Some(count),
            vulnerabilities,
        }
    }
}

/// Reduce an OSV record to the report shape.
fn reduce_vuln(vuln: OsvVuln) -> Vulnerability {
    let aliases = vuln.aliases.unwrap_or_default();
    let cve_ids: Vec<String> = aliases
        .iter()
        .filter(|a| a.starts_with("CVE-"))
        .cloned()
        .collect();

    let id = cve_ids.first().cloned().unwrap_or_else(|| vuln.id.clone());

    let severity = pick_severity(vuln.severity.as_deref().unwrap_or(&[]));

    let summary = vuln
        .summary
        .or(vuln.details)
        .unwrap_or_default();

    Vulnerability {
        id,
        cve_ids,
        severity,
        summary,
    }
}

/// Select the highest-numeric CVSS v3/v4 score, formatted "<scheme>:<score>".
/// Falls back to the first listed severity type, then "UNKNOWN".
fn pick_severity(entries: &[OsvSeverity]) -> String {
    let mut best: Option<(f64, String)> = None;

    for entry in entries {
        let Some(scheme) = entry.severity_type.as_deref() else {
            continue;
        };
        if !scheme.starts_with("CVSS_V3") && !scheme.starts_with("CVSS_V4") {
            continue;
        }
        let Some(score) = entry.score.as_deref() else {
            continue;
        };
        if let Ok(numeric) = score.parse::<f64>() {
            let formatted = format!("{}:{}", scheme, score);
            if best.as_ref().map(|(b, _)| numeric > *b).unwrap_or(true) {
                best = Some((numeric, formatted));
            }
        }
    }

    if let Some((_, formatted)) = best {
        return formatted;
    }

    entries
        .iter()
        .find_map(|e| e.severity_type.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_vuln(json: &str) -> OsvVuln {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_reduce_prefers_cve_alias() {
        let vuln = parse_vuln(
            r#"{
                "id": "GHSA-jf85-cpcp-j695",
                "aliases": ["CVE-2019-10744", "SNYK-JS-LODASH-450202"],
                "summary": "Prototype pollution in lodash"
            }"#,
        );

        let reduced = reduce_vuln(vuln);
        assert_eq!(reduced.id, "CVE-2019-10744");
        assert_eq!(reduced.cve_ids, vec!["CVE-2019-10744".to_string()]);
        assert_eq!(reduced.summary, "Prototype pollution in lodash");
    }

    #[test]
    fn test_reduce_falls_back_to_native_id() {
        let vuln = parse_vuln(
            r#"{"id": "GHSA-xxxx-yyyy-zzzz", "aliases": ["SNYK-1234"], "details": "detail text"}"#,
        );

        let reduced = reduce_vuln(vuln);
        assert_eq!(reduced.id, "GHSA-xxxx-yyyy-zzzz");
        assert!(reduced.cve_ids.is_empty());
        assert_eq!(reduced.summary, "detail text");
    }

    #[test]
    fn test_pick_severity_highest_numeric() {
        let entries = vec![
            OsvSeverity {
                severity_type: Some("CVSS_V3".to_string()),
                score: Some("6.1".to_string()),
            },
            OsvSeverity {
                severity_type: Some("CVSS_V4".to_string()),
                score: Some("8.2".to_string()),
            },
        ];

        assert_eq!(pick_severity(&entries), "CVSS_V4:8.2");
    }

    #[test]
    fn test_pick_severity_falls_back_to_type() {
        // Vector strings do not parse numerically; the type label is used.
        let entries = vec![OsvSeverity {
            severity_type: Some("CVSS_V3".to_string()),
            score: Some("CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N".to_string()),
        }];

        assert_eq!(pick_severity(&entries), "CVSS_V3");
    }

    #[test]
    fn test_pick_severity_unknown_when_empty() {
        assert_eq!(pick_severity(&[]), "UNKNOWN");
    }

    #[test]
    fn test_response_truncated_to_five() {
        let vulns: Vec<OsvVuln> = (0..8)
            .map(|i| parse_vuln(&format!(r#"{{"id": "GHSA-{:04}", "summary": "s"}}"#, i)))
            .collect();

        let count = vulns.len();
        let reduced: Vec<Vulnerability> = vulns
            .into_iter()
            .take(MAX_VULNERABILITIES)
            .map(reduce_vuln)
            .collect();

        assert_eq!(count, 8);
        assert_eq!(reduced.len(), 5);
        assert_eq!(reduced[0].id, "GHSA-0000");
    }

    #[test]
    fn test_unavailable_report() {
        let report = VulnReport::unavailable();
        assert!(report.count.is_none());
        assert!(report.vulnerabilities.is_empty());
    }
}
