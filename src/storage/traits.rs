//! Manifest trait and error types

use crate::output::ArtifactKind;
use crate::state::TaskState;
use crate::storage::{ArtifactRecord, RunRecord, RunStatus, RunTotals, TaskRecord};
use thiserror::Error;

/// Errors that can occur during manifest operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Provenance record of crawl runs, task outcomes and saved artifacts
///
/// The manifest is an audit trail only. The crawler never reads it back to
/// decide what to fetch; artifact reuse is decided by the files on disk.
pub trait Manifest {
    // ===== Run Management =====

    /// Opens a new run and returns its ID
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Stamps the finish time, final status, stop reason and totals of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        termination: Option<&str>,
        totals: &RunTotals,
    ) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    fn count_runs(&self) -> StorageResult<u64>;

    // ===== Tasks =====

    /// Inserts or replaces the outcome of a task within a run
    fn record_task(&mut self, run_id: i64, task: &TaskRecord) -> StorageResult<()>;

    fn get_task(&self, run_id: i64, normalized_url: &str) -> StorageResult<Option<TaskRecord>>;

    fn count_tasks_by_state(&self, run_id: i64, state: TaskState) -> StorageResult<u64>;

    /// Most recent failures of a run, newest first
    fn recent_failures(&self, run_id: i64, limit: usize) -> StorageResult<Vec<TaskRecord>>;

    // ===== Artifacts =====

    fn record_artifact(&mut self, run_id: i64, artifact: &ArtifactRecord) -> StorageResult<()>;

    fn list_artifacts(&self, run_id: i64) -> StorageResult<Vec<ArtifactRecord>>;

    fn count_artifacts_by_kind(&self, run_id: i64, kind: ArtifactKind) -> StorageResult<u64>;
}
