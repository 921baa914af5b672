//! Configuration handling for the scanner.

use crate::types::HttpConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Client-side JavaScript library inventory and exposure scanner.
#[derive(Parser, Debug, Clone)]
#[command(name = "libscout")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan a target page for outdated and vulnerable JS libraries
    Scan(ScanConfig),
    /// Download and set up a managed Chromium browser
    Setup(SetupConfig),
}

/// Configuration for the setup command.
#[derive(Parser, Debug, Clone)]
pub struct SetupConfig {
    /// Force re-download even if Chromium is already installed
    #[arg(long)]
    pub force: bool,
}

/// Configuration for the scan command.
#[derive(Parser, Debug, Clone)]
pub struct ScanConfig {
    /// Target URL to scan
    pub target: String,

    /// Verbose output, merged from the global flag
    #[arg(skip)]
    pub verbose: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Page request timeout in seconds
    #[arg(long, default_value = "15")]
    pub timeout: u64,

    /// Disable signature content fetching (filename patterns only)
    #[arg(long)]
    pub no_fetch: bool,

    /// Custom User-Agent string
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Quiet mode: only show output when vulnerable libraries are found
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Path to Chrome/Chromium executable (overrides auto-detection)
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            verbose: false,
            json: false,
            output: None,
            timeout: 15,
            no_fetch: false,
            user_agent: None,
            quiet: false,
            chrome_path: None,
        }
    }
}

impl ScanConfig {
    /// Get HTTP configuration from scan config.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout_secs: self.timeout,
            user_agent: self.user_agent.clone().unwrap_or_else(|| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
            }),
        }
    }

    /// Normalize the target to an absolute http(s) URL.
    pub fn normalized_target(&self) -> String {
        let t = self.target.trim();
        if !t.starts_with("http://") && !t.starts_with("https://") {
            format!("https://{}", t)
        } else {
            t.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_scan_requires_target() {
        let result = Config::try_parse_from(["libscout", "scan"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_parses_target() {
        let config = Config::try_parse_from(["libscout", "scan", "https://example.com"]).unwrap();
        match config.command {
            Commands::Scan(scan) => assert_eq!(scan.target, "https://example.com"),
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn test_normalized_target_adds_scheme() {
        let scan = ScanConfig {
            target: "example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(scan.normalized_target(), "https://example.com");

        let scan = ScanConfig {
            target: "http://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(scan.normalized_target(), "http://example.com");
    }
}
