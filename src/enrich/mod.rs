//! Enrichment module.
//!
//! Resolves each merged library's latest-version status against the npm
//! registry and its vulnerability exposure against OSV.dev. Both resolvers
//! degrade to null/empty results on any failure; neither ever aborts a scan.

pub mod osv;
pub mod registry;

pub use osv::{VulnReport, VulnerabilityResolver};
pub use registry::{AliasTable, VersionResolver, VersionStatus};
