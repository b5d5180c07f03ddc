//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier: scope rules, deduplication and per-domain budgets
//! - Per-domain request pacing
//! - HTTP fetching with retries, backoff and redirect tracking
//! - HTML parsing and link extraction
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod pacer;
mod parser;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    backoff_delay, build_http_client, Body, ContentKind, FetchError, FetchResult, Fetcher,
    HeadInfo, Payload,
};
pub use frontier::{CrawlTask, EnqueueOutcome, Frontier, SEED_CONTEXT};
pub use pacer::Pacer;
pub use parser::{is_pdf_link, parse_html, path_extension, PageLink, ParsedPage};
