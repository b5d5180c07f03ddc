//! URL handling module for Corpus-Crawler
//!
//! This module provides URL normalization, storage fingerprints, root-domain
//! extraction and host matching used by the frontier's scope rules.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::{extract_host, root_domain};
pub use matcher::{is_within_domain, matches_wildcard};
pub use normalize::{fingerprint, normalize_against, normalize_url, resolve_http_url};
