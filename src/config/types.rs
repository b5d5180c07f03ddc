use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Corpus-Crawler
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub scope: ScopeConfig,
    pub storage: StorageConfig,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Seed URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,

    /// Tasks deeper than this are discarded by the coordinator
    pub max_depth: u32,

    /// Global budget of successfully processed pages
    pub max_pages: u32,

    /// Maximum number of tasks enqueued per host
    pub max_pages_per_domain: u32,

    /// Timeout applied to every HTTP request (seconds)
    pub request_timeout_sec: f64,

    /// Minimum interval between requests to the same host (seconds)
    pub delay_between_requests_sec: f64,

    /// Pause after every fetched task, on top of per-host pacing (seconds)
    pub inter_request_delay_sec: f64,

    /// Transport-level retries for GET/HEAD
    pub max_retries: u32,

    /// Exponential backoff factor between retries (seconds)
    pub backoff_factor_sec: f64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Consult robots.txt before fetching
    pub respect_robots_txt: bool,

    /// Reject tasks deeper than `max_depth` when they are enqueued
    pub strict_depth: bool,

    /// Optional wall-clock limit for a whole run (seconds)
    pub max_run_time_sec: Option<f64>,
}

/// Largest value accepted for any seconds-valued setting (one week)
pub const MAX_SETTING_SECS: f64 = 604_800.0;

/// Seconds to a `Duration`, clamped to `0..=MAX_SETTING_SECS`; NaN becomes zero
fn bounded_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_SETTING_SECS)).unwrap_or_default()
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        bounded_secs(self.request_timeout_sec)
    }

    pub fn domain_delay(&self) -> Duration {
        bounded_secs(self.delay_between_requests_sec)
    }

    pub fn inter_request_delay(&self) -> Duration {
        bounded_secs(self.inter_request_delay_sec)
    }

    pub fn backoff_factor(&self) -> Duration {
        bounded_secs(self.backoff_factor_sec)
    }

    pub fn max_run_time(&self) -> Option<Duration> {
        self.max_run_time_sec.map(bounded_secs)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 3,
            max_pages: 500,
            max_pages_per_domain: 200,
            request_timeout_sec: 20.0,
            delay_between_requests_sec: 1.5,
            inter_request_delay_sec: 2.0,
            max_retries: 3,
            backoff_factor_sec: 2.0,
            max_redirects: 10,
            user_agent: "RAGBot/1.0".to_string(),
            respect_robots_txt: false,
            strict_depth: false,
            max_run_time_sec: None,
        }
    }
}

/// Crawl scope configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Never leave the seed domains, even for whitelisted sites
    pub internal_only: bool,

    /// Treat subdomains of a seed root domain as internal
    pub allow_subdomains: bool,

    /// External domains admitted when `internal_only` is off
    pub external_sites_whitelist: Vec<String>,

    /// URLs matching any of these regexes are rejected
    pub url_patterns_exclude: Vec<String>,

    /// When non-empty, URLs must match at least one of these regexes
    pub url_patterns_include: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            internal_only: true,
            allow_subdomains: true,
            external_sites_whitelist: Vec::new(),
            url_patterns_exclude: Vec::new(),
            url_patterns_include: Vec::new(),
        }
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `pages/`, `pdfs/` and `images/`
    pub root: PathBuf,

    /// Record provenance in `<root>/manifest.db`
    pub manifest: bool,

    /// Image references with these extensions are downloaded
    pub image_extensions: Vec<String>,
}

impl StorageConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.db")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/raw"),
            manifest: true,
            image_extensions: vec![".jpg".to_string(), ".jpeg".to_string(), ".png".to_string()],
        }
    }
}
