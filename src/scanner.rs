//! Main scanner orchestrating detection, merge, and enrichment.
//!
//! One scan = one target page. Detection signals are collected under
//! per-phase budgets, merged into a canonical library list, then enriched
//! concurrently with per-library budgets. Every budget uses
//! `tokio::time::timeout`, which drops the losing future, so a timed-out
//! operation stops consuming resources instead of finishing in the
//! background. No external call is ever retried.

use crate::config::ScanConfig;
use crate::detect::signatures::KnownVulnerability;
use crate::detect::{
    RuntimeDetector, RuntimeFindings, SignatureDatabase, SignatureDetector, StaticDetector,
};
use crate::enrich::registry::normalize_version;
use crate::enrich::{AliasTable, VersionResolver, VersionStatus, VulnReport, VulnerabilityResolver};
use crate::merge::merge_candidates;
use crate::output::ConsoleReporter;
use crate::page::{extract_script_srcs, resolve_script_urls, security_headers, PageClient};
use crate::types::{
    EnrichedLibrary, LibraryCandidate, Report, Result, ScoutError, TlsExpiry, UNKNOWN_VERSION,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Single overall deadline for a scan.
const SCAN_DEADLINE: Duration = Duration::from_secs(45);
/// Phase budget for runtime (browser) detection.
const RUNTIME_BUDGET: Duration = Duration::from_secs(20);
/// Phase budget for signature detection, fetches included.
const SIGNATURE_BUDGET: Duration = Duration::from_secs(15);
/// Phase budget for the TLS certificate check.
const TLS_BUDGET: Duration = Duration::from_secs(5);
/// Budget for each enrichment call (version and vulnerability separately).
const ENRICH_BUDGET: Duration = Duration::from_secs(4);

/// Browser navigation timeout within the runtime phase.
const NAV_TIMEOUT_SECS: u64 = 15;
/// Settle window for deferred script execution.
const SETTLE_MS: u64 = 1200;
/// Requests per second against the npm registry.
const REGISTRY_RATE_LIMIT: u32 = 10;

/// Main scanner that orchestrates all scanning components.
pub struct Scanner {
    page_client: PageClient,
    static_detector: StaticDetector,
    signature_detector: SignatureDetector,
    runtime_detector: RuntimeDetector,
    version_resolver: Arc<VersionResolver>,
    vuln_resolver: Arc<VulnerabilityResolver>,
    aliases: Arc<AliasTable>,
    signatures: Arc<SignatureDatabase>,
    console: ConsoleReporter,
}

impl Scanner {
    /// Create a new scanner with the given configuration.
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let http_config = config.http_config();

        let aliases = Arc::new(AliasTable::builtin());
        let signatures = Arc::new(SignatureDatabase::builtin());

        let page_client = PageClient::new(&http_config)?;
        let signature_detector =
            SignatureDetector::new(signatures.clone(), &http_config, !config.no_fetch)?;
        let runtime_detector = RuntimeDetector::new(NAV_TIMEOUT_SECS, SETTLE_MS)
            .with_chrome_executable(
                config
                    .chrome_path
                    .clone()
                    .or_else(crate::browser::resolve_chrome_executable),
            );

        let version_resolver = Arc::new(VersionResolver::new(
            config.timeout,
            REGISTRY_RATE_LIMIT,
            aliases.clone(),
        )?);
        let vuln_resolver = Arc::new(VulnerabilityResolver::new(config.timeout)?);

        let console = ConsoleReporter::new(config.verbose, config.json, config.quiet);

        Ok(Self {
            page_client,
            static_detector: StaticDetector::new(),
            signature_detector,
            runtime_detector,
            version_resolver,
            vuln_resolver,
            aliases,
            signatures,
            console,
        })
    }

    /// Scan a single target URL and assemble the report.
    pub async fn scan(&self, target: &str) -> Result<Report> {
        let start = Instant::now();
        self.console.print_scan_start(target);

        match tokio::time::timeout(SCAN_DEADLINE, self.run(target, start)).await {
            Ok(result) => result,
            Err(_) => Err(ScoutError::Timeout(format!(
                "scan exceeded {}s deadline",
                SCAN_DEADLINE.as_secs()
            ))),
        }
    }

    async fn run(&self, target: &str, start: Instant) -> Result<Report> {
        // The only fatal failure: no page, no report.
        self.console.print_progress("Fetching target page...");
        let page = self.page_client.fetch(target).await?;

        let headers = security_headers(&page);
        let script_urls = resolve_script_urls(target, &extract_script_srcs(&page.body));
        self.console
            .print_progress(&format!("Found {} script sources", script_urls.len()));

        let static_candidates = self.static_detector.detect(&script_urls);

        // Runtime detection and the TLS check are independent; run together.
        self.console
            .print_progress("Launching browser for runtime probes...");
        let (runtime_findings, tls_expiry) =
            tokio::join!(self.runtime_phase(target), self.tls_phase(target));

        let candidate_urls = union_urls(&script_urls, &runtime_findings.resource_urls);
        self.console.print_progress(&format!(
            "Signature-matching {} candidate URLs...",
            candidate_urls.len()
        ));
        let signature_candidates = match tokio::time::timeout(
            SIGNATURE_BUDGET,
            self.signature_detector.detect(&candidate_urls),
        )
        .await
        {
            Ok(candidates) => candidates,
            Err(_) => {
                warn!(
                    "Signature phase exceeded {}s, discarding",
                    SIGNATURE_BUDGET.as_secs()
                );
                Vec::new()
            }
        };

        // Merge in detector order: static, runtime, signature.
        let mut all_candidates = static_candidates;
        all_candidates.extend(runtime_findings.libraries);
        all_candidates.extend(signature_candidates);
        let merged = merge_candidates(all_candidates);

        self.console
            .print_info(&format!("Detected {} unique libraries", merged.len()));

        // Per-library fan-out; result order matches merged-list order.
        let libraries: Vec<EnrichedLibrary> =
            futures::future::join_all(merged.iter().map(|c| self.enrich_one(c))).await;

        self.log_known_ranges(&libraries);

        Ok(Report {
            target_url: target.to_string(),
            security_headers: headers,
            libraries,
            tls_expiry,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn runtime_phase(&self, target: &str) -> RuntimeFindings {
        match tokio::time::timeout(RUNTIME_BUDGET, self.runtime_detector.detect(target)).await {
            Ok(findings) => findings,
            Err(_) => {
                warn!(
                    "Runtime phase exceeded {}s, discarding",
                    RUNTIME_BUDGET.as_secs()
                );
                RuntimeFindings::default()
            }
        }
    }

    async fn tls_phase(&self, target: &str) -> Option<TlsExpiry> {
        let parsed = Url::parse(target).ok()?;
        if parsed.scheme() != "https" {
            return None;
        }
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default().unwrap_or(443);

        crate::tls::check_certificate(&host, port, TLS_BUDGET).await
    }

    /// Enrich one merged library. Failures and timeouts leave the library
    /// in the report with nulled enrichment fields; it is never dropped.
    async fn enrich_one(&self, candidate: &LibraryCandidate) -> EnrichedLibrary {
        let registry_name = self.aliases.canonical(&candidate.name);

        let (status, vulns) = tokio::join!(
            async {
                match tokio::time::timeout(
                    ENRICH_BUDGET,
                    self.version_resolver
                        .resolve(&candidate.name, &candidate.version),
                )
                .await
                {
                    Ok(status) => status,
                    Err(_) => {
                        debug!("Version lookup timed out for {}", candidate.name);
                        VersionStatus::unavailable(registry_name.clone())
                    }
                }
            },
            async {
                match tokio::time::timeout(
                    ENRICH_BUDGET,
                    self.vuln_resolver.lookup(&registry_name, &candidate.version),
                )
                .await
                {
                    Ok(report) => report,
                    Err(_) => {
                        debug!("Vulnerability lookup timed out for {}", candidate.name);
                        VulnReport::unavailable()
                    }
                }
            },
        );

        assemble_library(candidate, status, vulns)
    }

    /// Correlate detected versions against the signature database's known
    /// vulnerable ranges and surface matches as console notes. This is
    /// advisory output only; report fields come from the online resolvers.
    fn log_known_ranges(&self, libraries: &[EnrichedLibrary]) {
        for lib in libraries {
            if lib.version == UNKNOWN_VERSION {
                continue;
            }
            for range in self.signatures.ranges_for(&lib.name) {
                if version_in_range(&lib.version, range) {
                    self.console.print_info(&format!(
                        "{} {} falls in known vulnerable range (< {}): {}",
                        lib.name,
                        lib.version,
                        range.version_below,
                        range.identifiers.join(", ")
                    ));
                }
            }
        }
    }

    pub fn console(&self) -> &ConsoleReporter {
        &self.console
    }
}

/// Combine enrichment results with the merged candidate.
fn assemble_library(
    candidate: &LibraryCandidate,
    status: VersionStatus,
    vulns: VulnReport,
) -> EnrichedLibrary {
    EnrichedLibrary {
        name: candidate.name.clone(),
        version: candidate.version.clone(),
        source: candidate.source,
        locator: candidate.locator.clone(),
        registry_name: status.registry_name,
        latest_version: status.latest_version,
        is_outdated: status.is_outdated,
        version_diff: status.version_diff,
        vulnerability_count: vulns.count,
        vulnerabilities: vulns.vulnerabilities,
    }
}

/// Deduplicated union of script-src URLs and runtime-discovered resource
/// URLs, preserving first-seen order.
fn union_urls(script_urls: &[String], resource_urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    script_urls
        .iter()
        .chain(resource_urls.iter())
        .filter(|u| seen.insert(u.as_str().to_string()))
        .cloned()
        .collect()
}

/// Whether a concrete version falls inside a known vulnerable range.
fn version_in_range(version: &str, range: &KnownVulnerability) -> bool {
    let v = normalize_version(version);
    if v >= normalize_version(&range.version_below) {
        return false;
    }
    if let Some(lower) = &range.version_at_or_above {
        if v < normalize_version(lower) {
            return false;
        }
    }
    true
}
