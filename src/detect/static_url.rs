//! Static script-URL detection against a catalog of known library names.

use crate::types::{DetectionSource, LibraryCandidate};
use regex::Regex;
use tracing::debug;

/// Library names recognized in script URLs.
///
/// Matching is case-insensitive; the reported name is the catalog entry
/// capitalized. Entries are not mutually exclusive: a URL containing
/// "angularjs" also matches "angular".
const LIBRARY_CATALOG: &[&str] = &[
    "jquery",
    "react",
    "vue",
    "angularjs",
    "angular",
    "lodash",
    "underscore",
    "bootstrap",
    "moment",
    "d3",
    "backbone",
    "ember",
    "handlebars",
    "mustache",
    "knockout",
    "dojo",
    "axios",
];

/// Detector matching library name + version patterns in script URLs.
///
/// No network access; a URL that fails to match is simply not a candidate.
pub struct StaticDetector {
    patterns: Vec<(String, Regex)>,
}

impl StaticDetector {
    pub fn new() -> Self {
        let patterns = LIBRARY_CATALOG
            .iter()
            .filter_map(|name| {
                // name, optionally followed by "-" or "." and a dotted
                // numeric version of two or more components
                let pattern = format!(r"(?i){}(?:[-.](\d+(?:\.\d+)+))?", regex::escape(name));
                match Regex::new(&pattern) {
                    Ok(re) => Some((capitalize(name), re)),
                    Err(e) => {
                        debug!("Skipping catalog entry {}: {}", name, e);
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    /// Match every catalog entry against every script URL.
    pub fn detect(&self, script_urls: &[String]) -> Vec<LibraryCandidate> {
        let mut candidates = Vec::new();

        for url in script_urls {
            for (name, re) in &self.patterns {
                if let Some(caps) = re.captures(url) {
                    let version = caps.get(1).map(|m| m.as_str().to_string());
                    candidates.push(LibraryCandidate::new(
                        name.clone(),
                        version,
                        DetectionSource::StaticUrl,
                        url.clone(),
                    ));
                }
            }
        }

        candidates
    }
}

impl Default for StaticDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_VERSION;

    #[test]
    fn test_versioned_script_url() {
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/assets/jquery-3.5.1.min.js".to_string()];

        let candidates = detector.detect(&urls);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Jquery");
        assert_eq!(candidates[0].version, "3.5.1");
        assert_eq!(candidates[0].source, DetectionSource::StaticUrl);
        assert_eq!(candidates[0].locator, urls[0]);
    }

    #[test]
    fn test_dot_separated_version() {
        let detector = StaticDetector::new();
        let urls = vec!["https://cdn.example.com/lodash.4.17.21.js".to_string()];

        let candidates = detector.detect(&urls);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Lodash");
        assert_eq!(candidates[0].version, "4.17.21");
    }

    #[test]
    fn test_unversioned_match_yields_sentinel() {
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/js/react.production.min.js".to_string()];

        let candidates = detector.detect(&urls);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "React");
        assert_eq!(candidates[0].version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_single_component_version_not_captured() {
        // "jquery-3" is not a dotted version; the name still matches.
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/jquery-3.js".to_string()];

        let candidates = detector.detect(&urls);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_multiple_catalog_entries_for_one_url() {
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/angularjs-1.8.2.min.js".to_string()];

        let candidates = detector.detect(&urls);
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Angularjs"));
        assert!(names.contains(&"Angular"));
    }

    #[test]
    fn test_case_insensitive_match() {
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/jQuery-2.2.4.js".to_string()];

        let candidates = detector.detect(&urls);
        assert_eq!(candidates[0].name, "Jquery");
        assert_eq!(candidates[0].version, "2.2.4");
    }

    #[test]
    fn test_no_match_on_unrelated_url() {
        let detector = StaticDetector::new();
        let urls = vec!["https://example.com/assets/site.min.js".to_string()];
        assert!(detector.detect(&urls).is_empty());
    }
}
