//! Output module for persisting crawl results
//!
//! This module handles:
//! - Converting HTML pages to markdown with a provenance header
//! - Laying out saved pages, PDFs and images under the storage root
//! - Reporting run statistics

mod artifacts;
mod markdown;
pub mod stats;

pub use artifacts::{extension_for_content_type, ArtifactKind, ArtifactStore};
pub use markdown::{html_to_markdown, page_document, render_page, visible_text, NOISE_TAGS};
pub use stats::{
    load_statistics, print_manifest_statistics, print_statistics, CrawlStats, ManifestStatistics,
    Termination,
};
