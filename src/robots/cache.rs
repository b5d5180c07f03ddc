//! Robots.txt cache entries with 24 hour expiry

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// How long a fetched robots.txt stays valid
pub const ROBOTS_TTL_HOURS: i64 = 24;

/// Parsed robots.txt plus the time it was fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Stamps `rules` with the current time
    pub fn new(rules: ParsedRobots) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// True once the entry is older than [`ROBOTS_TTL_HOURS`]
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(ROBOTS_TTL_HOURS)
    }

    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        self.rules.is_allowed(url, agent)
    }
}
