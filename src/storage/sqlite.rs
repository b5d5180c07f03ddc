//! SQLite implementation of the provenance manifest

use crate::output::ArtifactKind;
use crate::state::TaskState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Manifest, StorageError, StorageResult};
use crate::storage::{ArtifactRecord, RunRecord, RunStatus, RunTotals, TaskRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, termination, \
                           pages_processed, tasks_failed, tasks_skipped";

const TASK_COLUMNS: &str = "normalized_url, url, depth, parent_url, context, state, \
                            status_code, content_type, title, error_message";

/// SQLite manifest backend
pub struct SqliteManifest {
    conn: Connection,
}

impl SqliteManifest {
    /// Opens or creates the manifest database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        termination: row.get(5)?,
        totals: RunTotals {
            pages_processed: row.get::<_, i64>(6)? as u64,
            tasks_failed: row.get::<_, i64>(7)? as u64,
            tasks_skipped: row.get::<_, i64>(8)? as u64,
        },
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        normalized_url: row.get(0)?,
        url: row.get(1)?,
        depth: row.get(2)?,
        parent_url: row.get(3)?,
        context: row.get(4)?,
        state: TaskState::from_db_string(&row.get::<_, String>(5)?).unwrap_or(TaskState::Failed),
        status_code: row.get(6)?,
        content_type: row.get(7)?,
        title: row.get(8)?,
        error_message: row.get(9)?,
    })
}

impl Manifest for SqliteManifest {
    // ===== Run Management =====

    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        termination: Option<&str>,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, termination = ?3,
                    pages_processed = ?4, tasks_failed = ?5, tasks_skipped = ?6
             WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                termination,
                totals.pages_processed as i64,
                totals.tasks_failed as i64,
                totals.tasks_skipped as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Tasks =====

    fn record_task(&mut self, run_id: i64, task: &TaskRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (run_id, normalized_url, url, depth, parent_url, context, state,
                                status_code, content_type, title, error_message, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(run_id, normalized_url) DO UPDATE SET
                state = excluded.state,
                status_code = excluded.status_code,
                content_type = excluded.content_type,
                title = excluded.title,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                run_id,
                task.normalized_url,
                task.url,
                task.depth,
                task.parent_url,
                task.context,
                task.state.to_db_string(),
                task.status_code,
                task.content_type,
                task.title,
                task.error_message,
                now
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, run_id: i64, normalized_url: &str) -> StorageResult<Option<TaskRecord>> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM tasks WHERE run_id = ?1 AND normalized_url = ?2",
                    TASK_COLUMNS
                ),
                params![run_id, normalized_url],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn count_tasks_by_state(&self, run_id: i64, state: TaskState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE run_id = ?1 AND state = ?2",
            params![run_id, state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn recent_failures(&self, run_id: i64, limit: usize) -> StorageResult<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE run_id = ?1 AND state = ?2 ORDER BY id DESC LIMIT ?3",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(
                params![run_id, TaskState::Failed.to_db_string(), limit as i64],
                task_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    // ===== Artifacts =====

    fn record_artifact(&mut self, run_id: i64, artifact: &ArtifactRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO artifacts (run_id, kind, fingerprint, source_url, path, content_type,
                                    size_bytes, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                artifact.kind.to_db_string(),
                artifact.fingerprint,
                artifact.source_url,
                artifact.path,
                artifact.content_type,
                artifact.size_bytes as i64,
                now
            ],
        )?;
        Ok(())
    }

    fn list_artifacts(&self, run_id: i64) -> StorageResult<Vec<ArtifactRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, fingerprint, source_url, path, content_type, size_bytes
             FROM artifacts WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ArtifactRecord {
                        kind: ArtifactKind::Page,
                        fingerprint: row.get(1)?,
                        source_url: row.get(2)?,
                        path: row.get(3)?,
                        content_type: row.get(4)?,
                        size_bytes: row.get::<_, i64>(5)? as u64,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, mut record)| {
                record.kind = ArtifactKind::from_db_string(&kind)?;
                Some(record)
            })
            .collect())
    }

    fn count_artifacts_by_kind(&self, run_id: i64, kind: ArtifactKind) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE run_id = ?1 AND kind = ?2",
            params![run_id, kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
