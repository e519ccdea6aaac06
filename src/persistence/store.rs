//! SQLite-based persistence store

use crate::core::{Run, RunStatus};
use crate::persistence::{create_summary, step_logs, PersistenceBackend, RunSummary, StepLog};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SUMMARY_COLUMNS: &str = "id, workflow_name, event, status, started_at, completed_at, \
     total_jobs, failed_jobs, executed_steps, progress";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (creating if needed) a store at the given path
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.as_ref().display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database, gone when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workflow-runner")
            .join("runs.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow_name TEXT NOT NULL,
                event TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_jobs INTEGER NOT NULL DEFAULT 0,
                failed_jobs INTEGER NOT NULL DEFAULT 0,
                executed_steps INTEGER NOT NULL DEFAULT 0,
                progress REAL NOT NULL DEFAULT 0.0
            );

            CREATE TABLE IF NOT EXISTS step_logs (
                run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                job_id TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                name TEXT NOT NULL,
                success INTEGER NOT NULL,
                exit_code INTEGER,
                output TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                PRIMARY KEY (run_id, job_id, step_index)
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_name ON runs(workflow_name);
            CREATE INDEX IF NOT EXISTS idx_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &SqliteRow) -> Result<RunSummary> {
        let status: String = row.try_get("status")?;
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            workflow_name: row.try_get("workflow_name")?,
            event: row.try_get("event")?,
            status: status.parse::<RunStatus>().map_err(|e| anyhow!(e))?,
            started_at: Self::from_naive(row.try_get("started_at")?),
            completed_at: row
                .try_get::<Option<NaiveDateTime>, _>("completed_at")?
                .map(Self::from_naive),
            total_jobs: row.try_get::<i64, _>("total_jobs")? as usize,
            failed_jobs: row.try_get::<i64, _>("failed_jobs")? as usize,
            executed_steps: row.try_get::<i64, _>("executed_steps")? as usize,
            progress: row.try_get("progress")?,
        })
    }

    fn row_to_step_log(row: &SqliteRow) -> Result<StepLog> {
        Ok(StepLog {
            run_id: Uuid::parse_str(&row.try_get::<String, _>("run_id")?)?,
            job_id: row.try_get("job_id")?,
            index: row.try_get::<i64, _>("step_index")? as usize,
            name: row.try_get("name")?,
            success: row.try_get("success")?,
            exit_code: row.try_get("exit_code")?,
            output: row.try_get("output")?,
            started_at: Self::from_naive(row.try_get("started_at")?),
            finished_at: Self::from_naive(row.try_get("finished_at")?),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &Run) -> Result<()> {
        let summary = create_summary(run);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, workflow_name, event, status, started_at, completed_at, total_jobs, failed_jobs, executed_steps, progress)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.workflow_name)
        .bind(&summary.event)
        .bind(summary.status.as_str())
        .bind(Self::to_naive(summary.started_at))
        .bind(summary.completed_at.map(Self::to_naive))
        .bind(summary.total_jobs as i64)
        .bind(summary.failed_jobs as i64)
        .bind(summary.executed_steps as i64)
        .bind(summary.progress)
        .execute(&mut *tx)
        .await
        .context("Failed to save run")?;

        sqlx::query("DELETE FROM step_logs WHERE run_id = ?1")
            .bind(summary.run_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to replace step logs")?;

        for log in step_logs(run) {
            sqlx::query(
                r#"
                INSERT INTO step_logs
                (run_id, job_id, step_index, name, success, exit_code, output, started_at, finished_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(log.run_id.to_string())
            .bind(&log.job_id)
            .bind(log.index as i64)
            .bind(&log.name)
            .bind(log.success)
            .bind(log.exit_code)
            .bind(&log.output)
            .bind(Self::to_naive(log.started_at))
            .bind(Self::to_naive(log.finished_at))
            .execute(&mut *tx)
            .await
            .context("Failed to save step log")?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", SUMMARY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }

    async fn load_step_logs(&self, run_id: Uuid) -> Result<Vec<StepLog>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, job_id, step_index, name, success, exit_code, output, started_at, finished_at
            FROM step_logs
            WHERE run_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load step logs")?;

        rows.iter().map(Self::row_to_step_log).collect()
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE workflow_name = ?1 ORDER BY started_at DESC",
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(workflow_name)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list runs")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM runs
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("workflow_name").map_err(anyhow::Error::from))
            .collect()
    }
}
