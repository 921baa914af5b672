//! Signature-database detection: filename and content patterns per library,
//! plus known vulnerable version ranges.
//!
//! The database is constructed once at startup and passed by reference into
//! the detector. Vulnerable ranges are exposed for report-level correlation;
//! they are never evaluated against the detected version inside this module.

use crate::types::{DetectionSource, HttpConfig, LibraryCandidate};
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Upper bound on candidates examined per scan.
const MAX_CANDIDATES: usize = 6;

/// Per-request timeout for content fetches.
const FETCH_TIMEOUT_SECS: u64 = 7;

/// Cap on fetched body size.
const MAX_CONTENT_BYTES: usize = 1_500_000;

/// Keywords marking a URL as a likely application bundle.
const BUNDLE_KEYWORDS: &[&str] = &[
    "bundle", "vendor", "main", "app", "chunk", "runtime", "polyfill",
];

/// URLs shorter than this are treated as likely direct library references.
const SHORT_URL_LEN: usize = 80;

/// A known vulnerable version range for one library.
#[derive(Debug, Clone)]
pub struct KnownVulnerability {
    pub identifiers: Vec<String>,
    pub info_links: Vec<String>,
    /// Exclusive upper bound of the vulnerable range.
    pub version_below: String,
    /// Optional inclusive lower bound.
    pub version_at_or_above: Option<String>,
    pub severity: String,
}

/// Detection patterns and known vulnerable ranges for one library.
#[derive(Debug, Clone)]
pub struct SignatureSpec {
    pub library_name: String,
    pub filename_patterns: Vec<Regex>,
    pub content_patterns: Vec<Regex>,
    pub known_vulnerabilities: Vec<KnownVulnerability>,
}

/// The full signature dataset, read-only for the process lifetime.
#[derive(Debug)]
pub struct SignatureDatabase {
    specs: Vec<SignatureSpec>,
}

impl SignatureDatabase {
    /// Compiled-in signature set.
    pub fn builtin() -> Self {
        let mut specs = Vec::new();

        specs.push(spec(
            "jQuery",
            &[r"(?i)jquery[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[
                r"(?i)/\*!?[^\n]{0,100}jQuery v?(\d+\.\d+(?:\.\d+)?)",
                r#"jquery:\s*"(\d+\.\d+(?:\.\d+)?)""#,
            ],
            vec![
                vuln(
                    &["CVE-2020-11022", "CVE-2020-11023"],
                    &["https://blog.jquery.com/2020/04/10/jquery-3-5-0-released/"],
                    "3.5.0",
                    None,
                    "medium",
                ),
                vuln(
                    &["CVE-2019-11358"],
                    &["https://github.com/jquery/jquery/commit/753d591aea698e57d6db"],
                    "3.4.0",
                    None,
                    "medium",
                ),
            ],
        ));

        specs.push(spec(
            "Lodash",
            &[r"(?i)lodash[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r#"(?i)lodash[^\n]{0,40}VERSION\s*=\s*['"](\d+\.\d+\.\d+)['"]"#],
            vec![
                vuln(
                    &["CVE-2021-23337"],
                    &["https://github.com/advisories/GHSA-35jh-r3h4-6jhm"],
                    "4.17.21",
                    None,
                    "high",
                ),
                vuln(
                    &["CVE-2019-10744"],
                    &["https://github.com/advisories/GHSA-jf85-cpcp-j695"],
                    "4.17.12",
                    None,
                    "critical",
                ),
            ],
        ));

        specs.push(spec(
            "AngularJS",
            &[r"(?i)angular(?:js)?[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r#"(?i)angularjs?[^\n]{0,60}v(\d+\.\d+\.\d+)"#],
            vec![vuln(
                &["CVE-2022-25869"],
                &["https://security.snyk.io/vuln/SNYK-JS-ANGULAR-2772735"],
                "1.8.3",
                None,
                "medium",
            )],
        ));

        specs.push(spec(
            "Moment",
            &[r"(?i)moment(?:-with-locales)?[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r#"(?i)//!\s*moment\.js[^\n]{0,40}version\s*:?\s*v?(\d+\.\d+\.\d+)"#],
            vec![vuln(
                &["CVE-2022-31129"],
                &["https://github.com/moment/moment/security/advisories/GHSA-wc69-rhjr-hc9g"],
                "2.29.4",
                None,
                "high",
            )],
        ));

        specs.push(spec(
            "Bootstrap",
            &[r"(?i)bootstrap(?:\.bundle)?[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r"(?i)Bootstrap\s+v(\d+\.\d+\.\d+)"],
            vec![vuln(
                &["CVE-2019-8331"],
                &["https://github.com/advisories/GHSA-9v3m-8fp8-mj99"],
                "4.3.1",
                None,
                "medium",
            )],
        ));

        specs.push(spec(
            "Handlebars",
            &[r"(?i)handlebars[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r#"(?i)handlebars[^\n]{0,40}v(\d+\.\d+\.\d+)"#],
            vec![vuln(
                &["CVE-2021-23369"],
                &["https://github.com/advisories/GHSA-f2jv-r9rf-7988"],
                "4.7.7",
                None,
                "critical",
            )],
        ));

        specs.push(spec(
            "Underscore",
            &[r"(?i)underscore[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?min)?\.js"],
            &[r#"(?i)underscore[^\n]{0,40}VERSION\s*=\s*['"](\d+\.\d+\.\d+)['"]"#],
            vec![vuln(
                &["CVE-2021-23358"],
                &["https://github.com/advisories/GHSA-cf4h-3jhx-xvhq"],
                "1.12.1",
                Some("1.3.2"),
                "high",
            )],
        ));

        specs.push(spec(
            "Vue",
            &[r"(?i)vue[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?(?:min|global|prod))*\.js"],
            &[r#"(?i)Vue\.js\s+v(\d+\.\d+\.\d+)"#],
            Vec::new(),
        ));

        specs.push(spec(
            "React",
            &[r"(?i)react(?:-dom)?[-.]?(\d+(?:\.\d+){1,3})?(?:[-.]?(?:min|production))*\.js"],
            &[r#"(?i)React\s+v(\d+\.\d+\.\d+)"#],
            Vec::new(),
        ));

        Self { specs }
    }

    pub fn specs(&self) -> &[SignatureSpec] {
        &self.specs
    }

    /// Known vulnerable ranges for a library, by case-insensitive name.
    pub fn ranges_for(&self, library_name: &str) -> &[KnownVulnerability] {
        self.specs
            .iter()
            .find(|s| s.library_name.eq_ignore_ascii_case(library_name))
            .map(|s| s.known_vulnerabilities.as_slice())
            .unwrap_or(&[])
    }
}

fn spec(
    name: &str,
    filename_patterns: &[&str],
    content_patterns: &[&str],
    known_vulnerabilities: Vec<KnownVulnerability>,
) -> SignatureSpec {
    SignatureSpec {
        library_name: name.to_string(),
        filename_patterns: compile_all(filename_patterns),
        content_patterns: compile_all(content_patterns),
        known_vulnerabilities,
    }
}

fn vuln(
    identifiers: &[&str],
    info_links: &[&str],
    version_below: &str,
    version_at_or_above: Option<&str>,
    severity: &str,
) -> KnownVulnerability {
    KnownVulnerability {
        identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
        info_links: info_links.iter().map(|s| s.to_string()).collect(),
        version_below: version_below.to_string(),
        version_at_or_above: version_at_or_above.map(|s| s.to_string()),
        severity: severity.to_string(),
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                debug!("Skipping signature pattern {}: {}", p, e);
                None
            }
        })
        .collect()
}

/// Detector matching candidate JS URLs against the signature database.
pub struct SignatureDetector {
    db: Arc<SignatureDatabase>,
    client: Client,
    allow_fetch: bool,
}

impl SignatureDetector {
    pub fn new(
        db: Arc<SignatureDatabase>,
        http: &HttpConfig,
        allow_fetch: bool,
    ) -> crate::types::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(&http.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            db,
            client,
            allow_fetch,
        })
    }

    /// Run signature detection over the deduplicated candidate URL set.
    ///
    /// Candidate fetches run sequentially within the bounded set; one
    /// failing fetch never aborts the pass.
    pub async fn detect(&self, candidate_urls: &[String]) -> Vec<LibraryCandidate> {
        let candidates = select_candidates(candidate_urls);
        let mut hits = Vec::new();

        for url in &candidates {
            let mut body: Option<String> = None;
            let mut fetch_attempted = false;

            for spec in self.db.specs() {
                let filename_version = spec
                    .filename_patterns
                    .iter()
                    .find_map(|re| re.captures(url).map(|caps| version_from_captures(&caps)));

                let Some(mut version) = filename_version else {
                    continue;
                };
                let mut source = DetectionSource::SignatureFile;

                if version.is_none() && self.allow_fetch {
                    if !fetch_attempted {
                        fetch_attempted = true;
                        body = self.fetch_body(url).await;
                    }
                    if let Some(ref content) = body {
                        let content_version = spec
                            .content_patterns
                            .iter()
                            .find_map(|re| re.captures(content).and_then(|caps| version_from_captures(&caps)));
                        if content_version.is_some() {
                            version = content_version;
                            source = DetectionSource::SignatureContent;
                        }
                    }
                }

                trace!(
                    "Signature hit: {} {:?} at {}",
                    spec.library_name,
                    version,
                    url
                );
                hits.push(LibraryCandidate::new(
                    spec.library_name.clone(),
                    version,
                    source,
                    url.clone(),
                ));
            }
        }

        dedupe_hits(hits)
    }

    /// Fetch a candidate body, capped at [`MAX_CONTENT_BYTES`].
    /// Any failure is swallowed and treated as no content.
    async fn fetch_body(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Signature fetch failed for {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("Signature fetch for {} returned {}", url, response.status());
            return None;
        }

        let mut buf: Vec<u8> = Vec::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    buf.extend_from_slice(&chunk);
                    if buf.len() >= MAX_CONTENT_BYTES {
                        buf.truncate(MAX_CONTENT_BYTES);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Signature fetch read error for {}: {}", url, e);
                    return None;
                }
            }
        }

        Some(String::from_utf8_lossy(&buf).to_string())
    }
}

/// Restrict the candidate set to a bounded prefix of URLs worth probing:
/// application-bundle names, or URLs short enough to be a direct library
/// reference.
fn select_candidates(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|u| seen.insert(u.to_lowercase()))
        .filter(|u| is_worth_probing(u))
        .take(MAX_CANDIDATES)
        .cloned()
        .collect()
}

fn is_worth_probing(url: &str) -> bool {
    let lower = url.to_lowercase();
    BUNDLE_KEYWORDS.iter().any(|kw| lower.contains(kw)) || url.len() < SHORT_URL_LEN
}

/// Scan captured groups in reverse order for the first dotted-numeric token.
fn version_from_captures(caps: &regex::Captures<'_>) -> Option<String> {
    let token = match Regex::new(r"\d+(?:\.\d+){1,3}") {
        Ok(re) => re,
        Err(_) => return None,
    };

    for i in (1..caps.len()).rev() {
        if let Some(group) = caps.get(i) {
            if let Some(m) = token.find(group.as_str()) {
                return Some(m.as_str().to_string());
            }
        }
    }

    None
}

/// Deduplicate raw hits by (name, version), dropping "unknown" entries for
/// libraries that also produced a concrete version.
fn dedupe_hits(hits: Vec<LibraryCandidate>) -> Vec<LibraryCandidate> {
    let concrete: HashSet<String> = hits
        .iter()
        .filter(|h| h.has_version())
        .map(|h| h.name.to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| h.has_version() || !concrete.contains(&h.name.to_lowercase()))
        .filter(|h| seen.insert((h.name.to_lowercase(), h.version.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_selection_is_bounded() {
        let urls: Vec<String> = (0..20)
            .map(|i| format!("https://example.com/static/bundle-{}.js", i))
            .collect();

        let selected = select_candidates(&urls);
        assert_eq!(selected.len(), MAX_CANDIDATES);
        assert_eq!(selected[0], urls[0]);
    }

    #[test]
    fn test_candidate_selection_filters_long_unbundled_urls() {
        let noise = format!(
            "https://example.com/{}/telemetry-collector-payload.js",
            "x".repeat(120)
        );
        let urls = vec![
            noise.clone(),
            "https://example.com/js/vendor.js".to_string(),
            "https://cdn.example.com/jquery.min.js".to_string(),
        ];

        let selected = select_candidates(&urls);
        assert!(!selected.contains(&noise));
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_candidate_selection_dedupes() {
        let urls = vec![
            "https://example.com/app.js".to_string(),
            "https://example.com/app.js".to_string(),
        ];
        assert_eq!(select_candidates(&urls).len(), 1);
    }

    #[test]
    fn test_version_from_captures_reverse_scan() {
        // Two groups; the later one holds the version token.
        let re = Regex::new(r"(lib)-(\d+\.\d+\.\d+)\.js").unwrap();
        let caps = re.captures("lib-1.2.3.js").unwrap();
        assert_eq!(version_from_captures(&caps), Some("1.2.3".to_string()));
    }

    #[test]
    fn test_version_from_captures_ignores_non_numeric_groups() {
        let re = Regex::new(r"(jquery)(?:-([a-z]+))?\.js").unwrap();
        let caps = re.captures("jquery-slim.js").unwrap();
        assert_eq!(version_from_captures(&caps), None);
    }

    #[test]
    fn test_filename_pattern_extracts_version() {
        let db = SignatureDatabase::builtin();
        let spec = db
            .specs()
            .iter()
            .find(|s| s.library_name == "jQuery")
            .unwrap();

        let url = "https://cdn.example.com/libs/jquery-3.4.1.min.js";
        let version = spec
            .filename_patterns
            .iter()
            .find_map(|re| re.captures(url).and_then(|c| version_from_captures(&c)));
        assert_eq!(version, Some("3.4.1".to_string()));
    }

    #[test]
    fn test_content_pattern_extracts_banner_version() {
        let db = SignatureDatabase::builtin();
        let spec = db
            .specs()
            .iter()
            .find(|s| s.library_name == "jQuery")
            .unwrap();

        let content = "/*! jQuery v3.4.1 | (c) JS Foundation */";
        let version = spec
            .content_patterns
            .iter()
            .find_map(|re| re.captures(content).and_then(|c| version_from_captures(&c)));
        assert_eq!(version, Some("3.4.1".to_string()));
    }

    #[test]
    fn test_dedupe_prefers_concrete_version() {
        let hits = vec![
            LibraryCandidate::new(
                "jQuery",
                None,
                DetectionSource::SignatureFile,
                "https://example.com/jquery.js",
            ),
            LibraryCandidate::new(
                "jQuery",
                Some("3.4.1".to_string()),
                DetectionSource::SignatureContent,
                "https://example.com/jquery.js",
            ),
        ];

        let deduped = dedupe_hits(hits);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].version, "3.4.1");
    }

    #[test]
    fn test_dedupe_drops_exact_duplicates() {
        let make = || {
            LibraryCandidate::new(
                "Lodash",
                Some("4.17.11".to_string()),
                DetectionSource::SignatureFile,
                "https://example.com/lodash-4.17.11.js",
            )
        };
        let deduped = dedupe_hits(vec![make(), make()]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn test_ranges_exposed_for_correlation() {
        let db = SignatureDatabase::builtin();
        let ranges = db.ranges_for("lodash");
        assert!(!ranges.is_empty());
        assert!(ranges
            .iter()
            .any(|r| r.identifiers.contains(&"CVE-2021-23337".to_string())));

        assert!(db.ranges_for("no-such-library").is_empty());
    }

    #[test]
    fn test_underscore_range_has_lower_bound() {
        let db = SignatureDatabase::builtin();
        let ranges = db.ranges_for("Underscore");
        assert_eq!(ranges[0].version_at_or_above.as_deref(), Some("1.3.2"));
        assert_eq!(ranges[0].version_below, "1.12.1");
    }
}
