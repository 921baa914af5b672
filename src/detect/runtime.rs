//! Runtime detection via headless Chrome (Chrome DevTools Protocol).
//!
//! Executes the page in a real browser engine to surface library evidence
//! that static URLs cannot provide: framework globals, version attributes
//! on the DOM, and the full set of JS resources the page actually loaded.
//!
//! Requires: Chrome or Chromium browser installed (auto-downloaded on first
//! use, see the `browser` module).

use crate::types::{
    DetectionSource, LibraryCandidate, Result, ScoutError, RUNTIME_LOCATOR,
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counter for generating unique browser profile directories.
static BROWSER_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-framework detection probes evaluated against page globals and DOM
/// attributes. Each expression yields a version string or null.
const PROBES: &[(&str, &str)] = &[
    (
        "jQuery",
        "(window.jQuery && window.jQuery.fn && window.jQuery.fn.jquery) || null",
    ),
    (
        "AngularJS",
        "(window.angular && window.angular.version && window.angular.version.full) || null",
    ),
    (
        "Angular",
        "(function(){var el=document.querySelector('[ng-version]');return el?el.getAttribute('ng-version'):null;})()",
    ),
    ("React", "(window.React && window.React.version) || null"),
    ("Vue", "(window.Vue && window.Vue.version) || null"),
    (
        // lodash and underscore share the `_` global; `chunk` is lodash-only
        "Lodash",
        "(window._ && window._.VERSION && window._.chunk) ? window._.VERSION : null",
    ),
    (
        "Underscore",
        "(window._ && window._.VERSION && !window._.chunk) ? window._.VERSION : null",
    ),
    ("Moment", "(window.moment && window.moment.version) || null"),
    (
        "Handlebars",
        "(window.Handlebars && window.Handlebars.VERSION) || null",
    ),
    (
        "Backbone",
        "(window.Backbone && window.Backbone.VERSION) || null",
    ),
    ("Ember", "(window.Ember && window.Ember.VERSION) || null"),
    ("D3", "(window.d3 && window.d3.version) || null"),
    (
        "Bootstrap",
        "(window.bootstrap && window.bootstrap.Tooltip && window.bootstrap.Tooltip.VERSION) || (window.jQuery && window.jQuery.fn && window.jQuery.fn.tooltip && window.jQuery.fn.tooltip.Constructor && window.jQuery.fn.tooltip.Constructor.VERSION) || null",
    ),
    ("Knockout", "(window.ko && window.ko.version) || null"),
];

/// Deduplicated JS resource URLs from the page's performance timeline.
const RESOURCE_QUERY: &str = r#"(function(){
    try {
        var urls = performance.getEntriesByType('resource')
            .filter(function(e){ return e.initiatorType === 'script' || /\.js(\?|$)/.test(e.name); })
            .map(function(e){ return e.name; });
        return Array.from(new Set(urls));
    } catch (err) {
        return [];
    }
})()"#;

/// URL patterns suppressed during navigation: heavy resource types and
/// known advertising domains.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.svg",
    "*.webp",
    "*.ico",
    "*.css",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.otf",
    "*.mp4",
    "*.webm",
    "*.mp3",
    "*googlesyndication.com*",
    "*doubleclick.net*",
    "*google-analytics.com*",
    "*googletagmanager.com*",
    "*adservice.google.*",
    "*connect.facebook.net*",
    "*hotjar.com*",
];

/// Runtime evidence: probed libraries plus loaded JS resource URLs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeFindings {
    pub libraries: Vec<LibraryCandidate>,
    pub resource_urls: Vec<String>,
}

/// Headless-browser runtime detector.
pub struct RuntimeDetector {
    /// Navigation timeout in seconds.
    nav_timeout_secs: u64,
    /// Settle window for deferred script execution, in milliseconds.
    settle_ms: u64,
    /// Explicit path to Chrome/Chromium executable.
    chrome_executable: Option<std::path::PathBuf>,
}

impl RuntimeDetector {
    pub fn new(nav_timeout_secs: u64, settle_ms: u64) -> Self {
        Self {
            nav_timeout_secs,
            settle_ms,
            chrome_executable: None,
        }
    }

    /// Set an explicit Chrome/Chromium executable path.
    pub fn with_chrome_executable(mut self, path: Option<std::path::PathBuf>) -> Self {
        self.chrome_executable = path;
        self
    }

    /// Run runtime detection. Any navigation, evaluation, or session
    /// failure degrades to an empty result; nothing propagates.
    pub async fn detect(&self, target: &str) -> RuntimeFindings {
        match self.capture(target).await {
            Ok(findings) => findings,
            Err(e) => {
                warn!("Runtime detection unavailable ({}), continuing", e);
                RuntimeFindings::default()
            }
        }
    }

    async fn capture(&self, target: &str) -> Result<RuntimeFindings> {
        info!("Probing with browser: {}", target);

        // Unique temporary profile so parallel sessions never conflict
        let instance_id = BROWSER_INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "libscout-browser-{}-{}",
            std::process::id(),
            instance_id
        ));

        if let Err(e) = std::fs::create_dir_all(&temp_dir) {
            debug!("Failed to create temp dir {:?}: {}", temp_dir, e);
        }

        let temp_dir_for_cleanup = temp_dir.clone();

        let (browser, mut handler) = self.launch_browser(&temp_dir).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        // Hard timeout around the whole session to prevent hangs
        let session_timeout =
            Duration::from_secs(self.nav_timeout_secs) + Duration::from_millis(self.settle_ms + 5000);
        let result = match tokio::time::timeout(session_timeout, self.probe_page(&browser, target))
            .await
        {
            Ok(r) => r,
            Err(_) => {
                warn!(
                    "Browser session exceeded {}s for {}, discarding",
                    session_timeout.as_secs(),
                    target
                );
                Ok(RuntimeFindings::default())
            }
        };

        // Teardown on every exit path, success or failure
        drop(browser);
        handler_task.abort();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Err(e) = std::fs::remove_dir_all(&temp_dir_for_cleanup) {
                debug!("Failed to cleanup temp dir {:?}: {}", temp_dir_for_cleanup, e);
            }
        });

        result
    }

    /// Build a BrowserConfig with the given temp directory.
    fn build_browser_config(
        &self,
        temp_dir: &std::path::Path,
        chrome_exe: Option<&std::path::Path>,
    ) -> Result<BrowserConfig> {
        let mut config_builder = BrowserConfig::builder().user_data_dir(temp_dir);

        if let Some(exe) = chrome_exe {
            config_builder = config_builder.chrome_executable(exe);
        }

        config_builder = config_builder.no_sandbox().viewport(None);

        config_builder
            .build()
            .map_err(|e| ScoutError::BrowserError(format!("Failed to build browser config: {}", e)))
    }

    /// Launch a browser, with auto-download fallback if no Chrome is found.
    async fn launch_browser(
        &self,
        temp_dir: &std::path::Path,
    ) -> Result<(
        Browser,
        impl futures::Stream<Item = std::result::Result<(), chromiumoxide::error::CdpError>>,
    )> {
        // Resolve executable: explicit path > previously downloaded > system Chrome
        let chrome_exe = self
            .chrome_executable
            .clone()
            .or_else(crate::browser::resolve_chrome_executable);

        let launch_result = match self.build_browser_config(temp_dir, chrome_exe.as_deref()) {
            Ok(config) => Browser::launch(config).await,
            Err(e) => Err(chromiumoxide::error::CdpError::msg(e.to_string())),
        };

        match launch_result {
            Ok(pair) => Ok(pair),
            Err(e) => {
                if chrome_exe.is_some() {
                    return Err(ScoutError::BrowserError(format!(
                        "Failed to launch browser with Chrome at {:?}: {}",
                        chrome_exe.unwrap(),
                        e
                    )));
                }

                warn!(
                    "Chrome not found, downloading Chromium automatically... (run `libscout setup` to pre-install)"
                );
                let exe = crate::browser::download_chrome(false).await?;

                let config = self.build_browser_config(temp_dir, Some(&exe))?;
                Browser::launch(config).await.map_err(|e| {
                    ScoutError::BrowserError(format!(
                        "Failed to launch browser even after downloading Chromium: {}",
                        e
                    ))
                })
            }
        }
    }

    /// Navigate, settle, probe globals, and read the resource timeline.
    async fn probe_page(&self, browser: &Browser, target: &str) -> Result<RuntimeFindings> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScoutError::BrowserError(format!("Failed to create page: {}", e)))?;

        // Suppress heavy resources and ad noise before navigating
        let blocked: Vec<String> = BLOCKED_URL_PATTERNS.iter().map(|p| p.to_string()).collect();
        if let Err(e) = page.execute(SetBlockedUrLsParams::new(blocked)).await {
            debug!("Failed to set blocked URLs (continuing): {}", e);
        }

        // Wait for initial DOM construction only, not network idle
        debug!("Navigating to: {}", target);
        let navigate_result = tokio::time::timeout(
            Duration::from_secs(self.nav_timeout_secs),
            page.goto(target),
        )
        .await;

        match navigate_result {
            Ok(Ok(_)) => debug!("Navigation completed"),
            Ok(Err(e)) => warn!("Navigation error (continuing): {}", e),
            Err(_) => warn!("Navigation timeout (continuing with current DOM)"),
        }

        // Settle window for deferred script execution
        tokio::time::sleep(Duration::from_millis(self.settle_ms)).await;

        let mut libraries = Vec::new();
        for (name, expr) in PROBES {
            let version: Option<String> = match page.evaluate(*expr).await {
                Ok(result) => result.into_value::<Option<String>>().ok().flatten(),
                Err(e) => {
                    debug!("Probe {} failed: {}", name, e);
                    None
                }
            };

            if let Some(version) = version {
                debug!("Runtime probe hit: {} {}", name, version);
                libraries.push(LibraryCandidate::new(
                    *name,
                    Some(version),
                    DetectionSource::Runtime,
                    RUNTIME_LOCATOR,
                ));
            }
        }

        let resource_urls: Vec<String> = match page.evaluate(RESOURCE_QUERY).await {
            Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
            Err(e) => {
                debug!("Resource timeline query failed: {}", e);
                Vec::new()
            }
        };

        info!(
            "Runtime detection: {} libraries, {} JS resources",
            libraries.len(),
            resource_urls.len()
        );

        Ok(RuntimeFindings {
            libraries,
            resource_urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_probe_names_are_unique() {
        let names: HashSet<&str> = PROBES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names.len(), PROBES.len());
    }

    #[test]
    fn test_probe_expressions_yield_null_fallback() {
        // Every probe must evaluate to null (not undefined) when the
        // library is absent, so deserialization stays uniform.
        for (name, expr) in PROBES {
            assert!(
                expr.contains("null"),
                "probe for {} lacks a null fallback",
                name
            );
        }
    }

    #[test]
    fn test_blocked_patterns_cover_heavy_types_and_ads() {
        assert!(BLOCKED_URL_PATTERNS.contains(&"*.png"));
        assert!(BLOCKED_URL_PATTERNS.contains(&"*.css"));
        assert!(BLOCKED_URL_PATTERNS
            .iter()
            .any(|p| p.contains("doubleclick")));
    }

    #[test]
    fn test_empty_findings_default() {
        let findings = RuntimeFindings::default();
        assert!(findings.libraries.is_empty());
        assert!(findings.resource_urls.is_empty());
    }
}
