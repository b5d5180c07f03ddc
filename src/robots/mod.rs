//! Robots.txt handling module
//!
//! Robots compliance is a pluggable policy consulted by the coordinator before
//! every fetch:
//! - [`AllowAll`]: the default, no lookups at all
//! - [`RobotsTxtPolicy`]: fetches `/robots.txt` once per origin through the
//!   shared fetcher (so lookups are paced like any other request), caches it
//!   for 24 hours and feeds any `Crawl-delay` into the per-domain pacer
//!
//! Lookups fail open: a missing or unreachable robots.txt allows everything.

mod cache;
mod parser;

pub use cache::{CachedRobots, ROBOTS_TTL_HOURS};
pub use parser::{ParsedRobots, MAX_CRAWL_DELAY};

use crate::config::CrawlConfig;
use crate::crawler::Fetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

/// Decides whether a URL may be fetched
#[async_trait]
pub trait RobotsPolicy: Send {
    async fn is_allowed(&mut self, url: &Url, fetcher: &Fetcher) -> bool;
}

/// Policy that never blocks and never issues requests
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn is_allowed(&mut self, _url: &Url, _fetcher: &Fetcher) -> bool {
        true
    }
}

/// Policy backed by each origin's robots.txt
#[derive(Debug)]
pub struct RobotsTxtPolicy {
    agent: String,
    cache: HashMap<String, CachedRobots>,
}

impl RobotsTxtPolicy {
    /// Creates a policy matching rules against the product token of `user_agent`
    pub fn new(user_agent: &str) -> Self {
        Self {
            agent: agent_token(user_agent).to_string(),
            cache: HashMap::new(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Number of origins with a cached robots.txt
    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl RobotsPolicy for RobotsTxtPolicy {
    async fn is_allowed(&mut self, url: &Url, fetcher: &Fetcher) -> bool {
        let origin = url.origin().ascii_serialization();

        let needs_fetch = self.cache.get(&origin).map_or(true, CachedRobots::is_stale);
        if needs_fetch {
            let rules = fetch_robots(&origin, fetcher).await;
            if let (Some(delay), Some(host)) = (rules.crawl_delay(&self.agent), url.host_str()) {
                fetcher.pacer().raise_delay(host, delay);
            }
            self.cache.insert(origin.clone(), CachedRobots::new(rules));
        }

        let allowed = self
            .cache
            .get(&origin)
            .map_or(true, |cached| cached.is_allowed(url.as_str(), &self.agent));
        if !allowed {
            tracing::info!("Blocked by robots.txt: {}", url);
        }
        allowed
    }
}

/// Fetches and parses `<origin>/robots.txt`, allowing everything on failure
pub async fn fetch_robots(origin: &str, fetcher: &Fetcher) -> ParsedRobots {
    let robots_url = format!("{}/robots.txt", origin);
    let result = fetcher.fetch(&robots_url).await;

    match result.text() {
        Some(body) if result.success() => {
            tracing::debug!("Loaded robots.txt for {}", origin);
            ParsedRobots::from_content(body)
        }
        _ => {
            tracing::debug!(
                "No usable robots.txt for {} (status {}), allowing all",
                origin,
                result.status_code
            );
            ParsedRobots::allow_all()
        }
    }
}

/// Builds the policy selected by `respect_robots_txt`
pub fn policy_for(config: &CrawlConfig) -> Box<dyn RobotsPolicy> {
    if config.respect_robots_txt {
        Box::new(RobotsTxtPolicy::new(&config.user_agent))
    } else {
        Box::new(AllowAll)
    }
}

/// Product token of a User-Agent string (`RAGBot/1.0` -> `RAGBot`)
pub fn agent_token(user_agent: &str) -> &str {
    let token = user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or("");
    if token.is_empty() {
        user_agent
    } else {
        token
    }
}
