//! Scoped, budgeted breadth-first work queue
//!
//! The frontier owns every piece of mutable crawl state that decides *what*
//! gets fetched: the FIFO queue, the visited set of normalized URLs, per-host
//! enqueue counters and the scope rules derived from the seeds. Rejections are
//! never errors; they are reported through [`EnqueueOutcome`] and counted.

use crate::config::{compile_patterns, Config};
use crate::url::{
    extract_host, fingerprint, is_within_domain, matches_wildcard, normalize_url,
    resolve_http_url, root_domain,
};
use crate::ConfigError;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use url::Url;

/// Discovery context attached to seed tasks
pub const SEED_CONTEXT: &str = "[SEED]";

/// Link prefixes that are dropped before any resolution is attempted
const IGNORED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// One queued unit of work
///
/// Two tasks with the same `normalized_url` are the same task; the frontier
/// never queues both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Absolute URL as resolved from the discovered link
    pub url: String,

    /// Canonical form used as identity
    pub normalized_url: String,

    /// Link distance from the seed that led here
    pub depth: u32,

    /// Page the link was found on (None for seeds)
    pub parent_url: Option<String>,

    /// Anchor text or `[SEED]`
    pub context: Option<String>,

    /// Storage key derived from the normalized URL
    pub fingerprint: String,
}

/// Result of a single enqueue decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Task was appended to the queue
    Accepted,

    /// Empty link or a non-navigational prefix (`mailto:`, `#`, ...)
    Ignored,

    /// Link could not be resolved, or is not http(s)
    Invalid,

    /// Normalized URL was already accepted
    Duplicate,

    /// Host is neither internal nor an admitted external site
    OutOfScope,

    /// Matched an exclude pattern
    Excluded,

    /// Include patterns are configured and none matched
    NotIncluded,

    /// Depth exceeds the maximum while strict depth is enabled
    TooDeep,

    /// The host already used its enqueue budget
    BudgetExhausted,
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Whether this outcome increments the frontier's skipped counter
    ///
    /// Syntactic rejections and duplicates are silent.
    pub fn counts_as_skipped(&self) -> bool {
        matches!(
            self,
            Self::OutOfScope
                | Self::Excluded
                | Self::NotIncluded
                | Self::TooDeep
                | Self::BudgetExhausted
        )
    }
}

/// The crawl frontier
///
/// Single-owner state: the coordinator holds it by value and every mutation
/// goes through `&mut self`, so the duplicate check and the visited insertion
/// happen as one step.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    visited: HashSet<String>,
    domain_counts: HashMap<String, u32>,

    seed_roots: HashSet<String>,
    seed_hosts: HashSet<String>,
    external_whitelist: Vec<String>,
    exclude_patterns: Vec<Regex>,
    include_patterns: Vec<Regex>,

    internal_only: bool,
    allow_subdomains: bool,
    max_pages_per_domain: u32,
    /// Set only in strict depth mode
    max_depth: Option<u32>,

    total_enqueued: u64,
    total_skipped: u64,
}

impl Frontier {
    /// Builds an empty frontier from the crawl and scope settings
    ///
    /// # Returns
    ///
    /// * `Ok(Frontier)` - Frontier ready for `add_seeds`
    /// * `Err(ConfigError)` - An include/exclude pattern failed to compile
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            domain_counts: HashMap::new(),
            seed_roots: HashSet::new(),
            seed_hosts: HashSet::new(),
            external_whitelist: config
                .scope
                .external_sites_whitelist
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect(),
            exclude_patterns: compile_patterns(&config.scope.url_patterns_exclude)?,
            include_patterns: compile_patterns(&config.scope.url_patterns_include)?,
            internal_only: config.scope.internal_only,
            allow_subdomains: config.scope.allow_subdomains,
            max_pages_per_domain: config.crawl.max_pages_per_domain,
            max_depth: config
                .crawl
                .strict_depth
                .then_some(config.crawl.max_depth),
            total_enqueued: 0,
            total_skipped: 0,
        })
    }

    /// Registers the seeds' root domains as home domains and enqueues them
    ///
    /// All roots are registered before the first seed is enqueued, so the
    /// order of seeds does not affect scope.
    pub fn add_seeds<S: AsRef<str>>(&mut self, seeds: &[S]) {
        for seed in seeds {
            match resolve_http_url(seed.as_ref(), None)
                .ok()
                .and_then(|url| extract_host(&url))
            {
                Some(host) => {
                    self.seed_roots.insert(root_domain(&host));
                    self.seed_hosts.insert(host);
                }
                None => tracing::warn!("Seed {} has no usable host", seed.as_ref()),
            }
        }

        for seed in seeds {
            let outcome = self.enqueue(seed.as_ref(), 0, None, Some(SEED_CONTEXT));
            if !outcome.is_accepted() {
                tracing::warn!("Seed {} was not enqueued: {:?}", seed.as_ref(), outcome);
            }
        }
    }

    /// Offers a discovered link to the frontier
    ///
    /// Checks, in order: ignorable prefixes, resolution against `parent_url`,
    /// scheme, duplicates, scope, exclude patterns, include patterns, strict
    /// depth and the per-host budget. Accepted links are marked visited and
    /// appended to the queue.
    pub fn enqueue(
        &mut self,
        link: &str,
        depth: u32,
        parent_url: Option<&str>,
        context: Option<&str>,
    ) -> EnqueueOutcome {
        let outcome = self.decide(link, depth, parent_url, context);

        if outcome.counts_as_skipped() {
            self.total_skipped += 1;
        }
        tracing::debug!("enqueue {} (depth {}): {:?}", link.trim(), depth, outcome);

        outcome
    }

    fn decide(
        &mut self,
        link: &str,
        depth: u32,
        parent_url: Option<&str>,
        context: Option<&str>,
    ) -> EnqueueOutcome {
        let link = link.trim();
        if link.is_empty() || IGNORED_PREFIXES.iter().any(|p| link.starts_with(p)) {
            return EnqueueOutcome::Ignored;
        }

        let url = match resolve_http_url(link, parent_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Rejected link {}: {}", link, e);
                return EnqueueOutcome::Invalid;
            }
        };

        let normalized = normalize_url(url.as_str());
        if self.visited.contains(&normalized) {
            return EnqueueOutcome::Duplicate;
        }

        if !self.is_in_scope(&url) {
            return EnqueueOutcome::OutOfScope;
        }

        let raw = url.as_str();
        if self.exclude_patterns.iter().any(|p| p.is_match(raw)) {
            return EnqueueOutcome::Excluded;
        }

        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| p.is_match(raw))
        {
            return EnqueueOutcome::NotIncluded;
        }

        if self.max_depth.is_some_and(|max| depth > max) {
            return EnqueueOutcome::TooDeep;
        }

        let host = extract_host(&url).unwrap_or_default();
        let count = self.domain_counts.get(&host).copied().unwrap_or(0);
        if count >= self.max_pages_per_domain {
            return EnqueueOutcome::BudgetExhausted;
        }

        self.visited.insert(normalized.clone());
        self.queue.push_back(CrawlTask {
            url: url.to_string(),
            fingerprint: fingerprint(&normalized),
            normalized_url: normalized,
            depth,
            parent_url: parent_url.map(str::to_string),
            context: context
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        });
        *self.domain_counts.entry(host).or_insert(0) += 1;
        self.total_enqueued += 1;

        EnqueueOutcome::Accepted
    }

    /// Returns true if the URL's host may be crawled
    ///
    /// Internal hosts share a root domain with a seed (or, with subdomains
    /// enabled, sit under one). Without subdomains only the seed hosts and
    /// bare seed roots are internal. External hosts pass only when
    /// `internal_only` is off and the host or its root matches a whitelist
    /// entry (`*.` wildcards allowed).
    pub fn is_in_scope(&self, url: &Url) -> bool {
        let Some(host) = extract_host(url) else {
            return false;
        };

        if self.is_internal(&host) {
            return true;
        }

        if self.internal_only {
            return false;
        }

        let root = root_domain(&host);
        self.external_whitelist
            .iter()
            .any(|entry| matches_wildcard(entry, &host) || matches_wildcard(entry, &root))
    }

    fn is_internal(&self, host: &str) -> bool {
        if self.allow_subdomains {
            self.seed_roots.contains(&root_domain(host))
                || self
                    .seed_roots
                    .iter()
                    .any(|root| is_within_domain(host, root))
        } else {
            self.seed_hosts.contains(host) || self.seed_roots.contains(host)
        }
    }

    /// Pops the oldest task
    pub fn dequeue(&mut self) -> Option<CrawlTask> {
        self.queue.pop_front()
    }

    /// True when no task is waiting
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued tasks in dequeue order
    pub fn pending(&self) -> impl Iterator<Item = &CrawlTask> {
        self.queue.iter()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    /// Number of tasks enqueued for `host` so far
    pub fn domain_count(&self, host: &str) -> u32 {
        self.domain_counts.get(host).copied().unwrap_or(0)
    }

    /// Root domains registered from the seeds
    pub fn seed_roots(&self) -> impl Iterator<Item = &str> {
        self.seed_roots.iter().map(String::as_str)
    }
}
