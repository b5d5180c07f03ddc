//! Configuration module for Corpus-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use corpus_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawl.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, ScopeConfig, StorageConfig, MAX_SETTING_SECS};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, read_config};
pub use validation::{compile_patterns, validate};
