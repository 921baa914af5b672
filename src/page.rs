//! Page fetching and script-source extraction.
//!
//! Thin wrapper around the initial page request. This is the only place in
//! the scanner where a network failure is fatal: without the base HTML and
//! response headers there is nothing to report on.

use crate::types::{HttpConfig, Result, ScoutError};
use regex::Regex;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Security headers surfaced in every report.
pub const SECURITY_HEADERS: &[&str] = &[
    "Strict-Transport-Security",
    "Content-Security-Policy",
    "X-Frame-Options",
];

/// Placeholder value for a header the response did not carry.
pub const MISSING_HEADER: &str = "missing";

/// Response headers and body of the target page.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// Header name (lowercased) -> first value.
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Client for the initial page request.
pub struct PageClient {
    client: Client,
}

impl PageClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }

    /// Fetch the target page. Errors here propagate and abort the scan.
    pub async fn fetch(&self, url: &str) -> Result<PageSnapshot> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ScoutError::HttpError(
                response.error_for_status().unwrap_err(),
            ));
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers
                    .entry(name.as_str().to_lowercase())
                    .or_insert_with(|| v.to_string());
            }
        }

        let body = response.text().await?;
        debug!("Fetched page: {} bytes", body.len());

        Ok(PageSnapshot { headers, body })
    }
}

/// Extract the ordered `src` attribute values of script elements.
pub fn extract_script_srcs(body: &str) -> Vec<String> {
    let pattern = r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#;
    let mut srcs = Vec::new();

    if let Ok(re) = Regex::new(pattern) {
        for caps in re.captures_iter(body) {
            if let Some(src) = caps.get(1) {
                srcs.push(src.as_str().trim().to_string());
            }
        }
    }

    srcs
}

/// Resolve raw `src` values against the page URL, dropping anything that
/// does not resolve to an http(s) URL.
pub fn resolve_script_urls(page_url: &str, srcs: &[String]) -> Vec<String> {
    let base = match Url::parse(page_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    srcs.iter()
        .filter_map(|src| base.join(src).ok())
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .map(|u| u.to_string())
        .collect()
}

/// Report the baseline security headers, with "missing" for absent ones.
pub fn security_headers(snapshot: &PageSnapshot) -> BTreeMap<String, String> {
    SECURITY_HEADERS
        .iter()
        .map(|name| {
            let value = snapshot
                .headers
                .get(&name.to_lowercase())
                .cloned()
                .unwrap_or_else(|| MISSING_HEADER.to_string());
            (name.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_script_srcs_ordered() {
        let body = r#"
            <html><head>
            <script src="/assets/jquery-3.5.1.min.js"></script>
            <script type="text/javascript" src='https://cdn.example.com/app.js'></script>
            <script>inline();</script>
            </head></html>
        "#;

        let srcs = extract_script_srcs(body);
        assert_eq!(
            srcs,
            vec![
                "/assets/jquery-3.5.1.min.js".to_string(),
                "https://cdn.example.com/app.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_relative_urls() {
        let srcs = vec![
            "/assets/main.js".to_string(),
            "vendor/lodash.js".to_string(),
            "data:text/javascript,void(0)".to_string(),
        ];

        let resolved = resolve_script_urls("https://example.com/page/index.html", &srcs);
        assert_eq!(
            resolved,
            vec![
                "https://example.com/assets/main.js".to_string(),
                "https://example.com/page/vendor/lodash.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_security_headers_missing_fallback() {
        let mut headers = HashMap::new();
        headers.insert(
            "content-security-policy".to_string(),
            "default-src 'self'".to_string(),
        );
        let snapshot = PageSnapshot {
            headers,
            body: String::new(),
        };

        let reported = security_headers(&snapshot);
        assert_eq!(
            reported.get("Content-Security-Policy").map(String::as_str),
            Some("default-src 'self'")
        );
        assert_eq!(
            reported
                .get("Strict-Transport-Security")
                .map(String::as_str),
            Some(MISSING_HEADER)
        );
        assert_eq!(
            reported.get("X-Frame-Options").map(String::as_str),
            Some(MISSING_HEADER)
        );
    }
}
