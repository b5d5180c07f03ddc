//! Run statistics
//!
//! This module provides:
//! - `CrawlStats`: counters a coordinator accumulates during one run
//! - `ManifestStatistics`: the latest run as recorded in the manifest
//!   (`--stats`)

use crate::output::ArtifactKind;
use crate::state::TaskState;
use crate::storage::{Manifest, RunRecord, RunTotals, TaskRecord};
use crate::CrawlError;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Why the main loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// No tasks left in the frontier
    #[default]
    QueueExhausted,

    /// Global page budget reached
    PageBudgetReached,

    /// Wall-clock limit reached
    DeadlineReached,

    /// Shutdown requested (e.g. Ctrl-C)
    Interrupted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueExhausted => "queue_exhausted",
            Self::PageBudgetReached => "page_budget_reached",
            Self::DeadlineReached => "deadline_reached",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Tasks fetched with status 200 (counts against `max_pages`)
    pub pages_processed: u64,

    /// Tasks whose fetch failed
    pub tasks_failed: u64,

    /// Dequeued tasks dropped without fetching (depth, duplicate, robots, reuse)
    pub tasks_skipped: u64,

    /// Tasks accepted by the frontier
    pub frontier_enqueued: u64,

    /// Links rejected by the frontier for scope, pattern, depth or budget
    pub frontier_skipped: u64,

    /// Distinct URLs the frontier ever accepted
    pub visited: usize,

    pub pages_saved: u64,
    pub pdfs_saved: u64,
    pub images_saved: u64,

    /// Binary downloads skipped because the file already existed
    pub binaries_reused: u64,

    /// Binary downloads that failed to fetch or write
    pub downloads_failed: u64,

    pub elapsed: Duration,
    pub termination: Termination,
}

impl CrawlStats {
    pub fn artifacts_saved(&self) -> u64 {
        self.pages_saved + self.pdfs_saved + self.images_saved
    }

    /// Totals stored with the run in the manifest
    pub fn run_totals(&self) -> RunTotals {
        RunTotals {
            pages_processed: self.pages_processed,
            tasks_failed: self.tasks_failed,
            tasks_skipped: self.tasks_skipped,
        }
    }
}

/// Prints a finished run's report to stdout
pub fn print_statistics(stats: &CrawlStats) {
    println!("=== Crawl Report ===\n");

    println!("Run:");
    println!("  Stopped because: {}", stats.termination);
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!();

    println!("Tasks:");
    println!("  Processed: {}", stats.pages_processed);
    println!("  Failed: {}", stats.tasks_failed);
    println!("  Skipped: {}", stats.tasks_skipped);
    println!("  Unique URLs visited: {}", stats.visited);
    println!();

    println!("Frontier:");
    println!("  Enqueued: {}", stats.frontier_enqueued);
    println!("  Rejected: {}", stats.frontier_skipped);
    println!();

    println!("Artifacts:");
    println!("  Pages: {}", stats.pages_saved);
    println!("  PDFs: {}", stats.pdfs_saved);
    println!("  Images: {}", stats.images_saved);
    if stats.binaries_reused > 0 {
        println!("  Reused from earlier runs: {}", stats.binaries_reused);
    }
    if stats.downloads_failed > 0 {
        println!("  Failed downloads: {}", stats.downloads_failed);
    }
}

/// The latest run as recorded in the manifest
#[derive(Debug, Clone)]
pub struct ManifestStatistics {
    pub total_runs: u64,
    pub latest_run: Option<RunRecord>,
    pub tasks_by_state: HashMap<TaskState, u64>,
    pub artifacts_by_kind: HashMap<ArtifactKind, u64>,
    pub recent_failures: Vec<TaskRecord>,
}

/// Loads statistics for the most recent run
///
/// # Arguments
///
/// * `manifest` - The manifest to query
///
/// # Returns
///
/// * `Ok(ManifestStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query the manifest
pub fn load_statistics(manifest: &dyn Manifest) -> Result<ManifestStatistics, CrawlError> {
    let total_runs = manifest.count_runs()?;
    let latest_run = manifest.get_latest_run()?;

    let mut tasks_by_state = HashMap::new();
    let mut artifacts_by_kind = HashMap::new();
    let mut recent_failures = Vec::new();

    if let Some(run) = &latest_run {
        for state in TaskState::all_states() {
            let count = manifest.count_tasks_by_state(run.id, state)?;
            if count > 0 {
                tasks_by_state.insert(state, count);
            }
        }

        for kind in [ArtifactKind::Page, ArtifactKind::Pdf, ArtifactKind::Image] {
            artifacts_by_kind.insert(kind, manifest.count_artifacts_by_kind(run.id, kind)?);
        }

        recent_failures = manifest.recent_failures(run.id, 10)?;
    }

    Ok(ManifestStatistics {
        total_runs,
        latest_run,
        tasks_by_state,
        artifacts_by_kind,
        recent_failures,
    })
}

/// Prints manifest statistics to stdout
pub fn print_manifest_statistics(stats: &ManifestStatistics) {
    println!("=== Manifest Statistics ===\n");
    println!("Runs recorded: {}", stats.total_runs);

    let Some(run) = &stats.latest_run else {
        println!("No crawl runs found.");
        return;
    };

    println!();
    println!("Latest run (#{}):", run.id);
    println!("  Started: {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("  Finished: {}", finished);
    }
    println!("  Status: {}", run.status.to_db_string());
    if let Some(termination) = &run.termination {
        println!("  Stopped because: {}", termination);
    }
    println!("  Config hash: {}", run.config_hash);
    println!();

    println!("Tasks by State:");
    let mut state_counts: Vec<_> = stats.tasks_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (state, count) in state_counts {
        println!("  {}: {}", state, count);
    }
    println!();

    println!("Artifacts:");
    for kind in [ArtifactKind::Page, ArtifactKind::Pdf, ArtifactKind::Image] {
        let count = stats.artifacts_by_kind.get(&kind).copied().unwrap_or(0);
        println!("  {}: {}", kind.dir_name(), count);
    }

    if !stats.recent_failures.is_empty() {
        println!();
        println!("Recent Failures:");
        for task in &stats.recent_failures {
            println!(
                "  - {} ({})",
                task.url,
                task.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
