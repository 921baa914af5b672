//! Library detection module.
//!
//! Three independent detection signals feed the merge step:
//! - Static URL matching against a catalog of known library names
//! - Signature-database matching (filename and content patterns)
//! - Runtime introspection via headless Chrome

pub mod runtime;
pub mod signatures;
pub mod static_url;

pub use runtime::{RuntimeDetector, RuntimeFindings};
pub use signatures::{SignatureDatabase, SignatureDetector, SignatureSpec};
pub use static_url::StaticDetector;
