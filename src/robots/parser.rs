//! Robots.txt rules for a single origin
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. The crate does
//! not expose `Crawl-delay`, so that directive is read by a small group-aware
//! scan of the same body.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Longest `Crawl-delay` honored; larger values are clamped to it
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(120);

/// Parsed robots.txt for one origin
///
/// An absent body means "allow everything"; that is what an origin without a
/// reachable robots.txt gets.
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    body: Option<String>,
}

impl ParsedRobots {
    /// Wraps a fetched robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            body: Some(content.to_string()),
        }
    }

    /// Rules that allow every URL
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self.body.as_deref().map_or(true, |b| b.trim().is_empty())
    }

    /// Checks a full URL against the rules for `agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL (scheme and host are ignored by the matcher)
    /// * `agent` - Product token, e.g. `RAGBot`
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, agent, url)
            }
            _ => true,
        }
    }

    /// `Crawl-delay` that applies to `agent`
    ///
    /// A group naming the agent wins over the `*` group. Multiple
    /// `User-agent` lines in a row form one group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let body = self.body.as_deref()?;
        let agent = agent.to_ascii_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut group_has_rules = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group.clear();
                        group_has_rules = false;
                    }
                    group.push(value.to_ascii_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    let Some(delay) = value
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d >= 0.0)
                    else {
                        continue;
                    };
                    if group.iter().any(|ua| *ua == agent) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => group_has_rules = true,
            }
        }

        specific.or(wildcard).map(|secs| {
            Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_CRAWL_DELAY)
                .min(MAX_CRAWL_DELAY)
        })
    }
}
