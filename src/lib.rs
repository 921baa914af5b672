//! libscout - client-side JavaScript library inventory and exposure scanner.
//!
//! This library inspects a target web page and reports:
//! - Which client-side JS libraries it loads, from three signals:
//!   static URL patterns, runtime browser probes, and a signature database
//! - Whether detected versions are outdated against the npm registry
//! - Known vulnerabilities for each library version (OSV.dev)
//! - Baseline security-header presence and TLS certificate expiry
//!
//! # Example
//!
//! ```no_run
//! use libscout::scanner::Scanner;
//! use libscout::config::ScanConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scanner = Scanner::new(&ScanConfig::default()).unwrap();
//!     let report = scanner.scan("https://example.com").await.unwrap();
//!     println!("Found {} libraries", report.libraries.len());
//! }
//! ```

pub mod browser;
pub mod config;
pub mod detect;
pub mod enrich;
pub mod merge;
pub mod output;
pub mod page;
pub mod scanner;
pub mod tls;
pub mod types;

pub use config::{Commands, Config, ScanConfig, SetupConfig};
pub use scanner::Scanner;
pub use types::{
    DetectionSource, EnrichedLibrary, LibraryCandidate, Report, Result, ScoutError, TlsExpiry,
    VersionDiff, Vulnerability,
};
