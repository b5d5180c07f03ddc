//! Storage module for the provenance manifest
//!
//! This module handles the optional SQLite manifest kept next to the saved
//! artifacts (`<root>/manifest.db`):
//! - Run tracking (start/finish, config hash, termination reason, totals)
//! - Per-task outcomes (state, status code, content type, error)
//! - Saved artifact records (kind, fingerprint, source URL, path, size)

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteManifest;
pub use traits::{Manifest, StorageError, StorageResult};

use crate::crawler::CrawlTask;
use crate::output::ArtifactKind;
use crate::state::TaskState;

use std::path::Path;

/// Opens (or creates) the manifest database at `path`
pub fn open_manifest(path: &Path) -> StorageResult<SqliteManifest> {
    SqliteManifest::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub termination: Option<String>,
    pub totals: RunTotals,
}

/// Counters stored with a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub pages_processed: u64,
    pub tasks_failed: u64,
    pub tasks_skipped: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome of one task as stored in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub normalized_url: String,
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub context: Option<String>,
    pub state: TaskState,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub error_message: Option<String>,
}

impl TaskRecord {
    /// Starts a record for a freshly dequeued task
    pub fn queued(task: &CrawlTask) -> Self {
        Self {
            normalized_url: task.normalized_url.clone(),
            url: task.url.clone(),
            depth: task.depth,
            parent_url: task.parent_url.clone(),
            context: task.context.clone(),
            state: TaskState::Queued,
            status_code: None,
            content_type: None,
            title: None,
            error_message: None,
        }
    }

    /// Moves the record to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: TaskState) -> StorageResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(StorageError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// A saved file and its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub fingerprint: String,
    pub source_url: String,
    pub path: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}
