// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_protocol::RunStatus;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{AttemptRecord, Persistence, RunRecord, StepRecord};
use crate::error::CoreError;
use crate::migrations;

const RUN_COLUMNS: &str = "run_id, workflow_id, workflow_type, task_queue, status, input, \
     output, error, worker_id, lease_expires_at, claim_count, created_at, started_at, \
     finished_at, deadline";

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, creating the database if needed, and run migrations.
    ///
    /// `sqlite::memory:` gets a single-connection pool, since every
    /// connection to an in-memory database sees its own private copy.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Invalid SQLite URL '{}': {}", url, e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at '{}': {}", url, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Create and initialize a SQLite database at a file path, creating
    /// parent directories as needed.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        Self::connect(&format!("sqlite:{}", path.to_string_lossy())).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn insert_run(&self, run: &RunRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO runs (run_id, workflow_id, workflow_type, task_queue, status, input,
                              claim_count, created_at, deadline)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.workflow_id)
        .bind(&run.workflow_type)
        .bind(&run.task_queue)
        .bind(&run.status)
        .bind(&run.input)
        .bind(run.claim_count)
        .bind(run.created_at)
        .bind(run.deadline)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                match &run.workflow_id {
                    Some(workflow_id) => Err(CoreError::RunAlreadyStarted {
                        workflow_id: workflow_id.clone(),
                    }),
                    None => Err(CoreError::DatabaseError {
                        operation: "insert_run".to_string(),
                        details: db.to_string(),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CoreError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?");
        let record = sqlx::query_as::<_, RunRecord>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn claim_next_run(
        &self,
        task_queue: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<RunRecord>, CoreError> {
        // Single statement: the sub-select and the guarded update run under
        // one write lock, so two workers can never lease the same run.
        let sql = format!(
            r#"
            UPDATE runs
            SET worker_id = ?1,
                lease_expires_at = ?2,
                claim_count = claim_count + 1,
                started_at = COALESCE(started_at, ?3)
            WHERE run_id = (
                SELECT run_id FROM runs
                WHERE task_queue = ?4 AND status = 'running' AND worker_id IS NULL
                ORDER BY created_at, run_id
                LIMIT 1
            )
              AND worker_id IS NULL
            RETURNING {RUN_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, RunRecord>(&sql)
            .bind(worker_id)
            .bind(lease_expires_at)
            .bind(now)
            .bind(task_queue)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn extend_lease(
        &self,
        run_id: &str,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET lease_expires_at = ?
            WHERE run_id = ? AND worker_id = ? AND status = 'running'
            "#,
        )
        .bind(lease_expires_at)
        .bind(run_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn finish_run(
        &self,
        run_id: &str,
        worker_id: Option<&str>,
        status: RunStatus,
        output: Option<&str>,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?1,
                output = ?2,
                error = ?3,
                finished_at = ?4,
                lease_expires_at = NULL
            WHERE run_id = ?5
              AND status = 'running'
              AND (?6 IS NULL OR worker_id = ?6)
            "#,
        )
        .bind(status.as_str())
        .bind(output)
        .bind(error)
        .bind(finished_at)
        .bind(run_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn requeue_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE runs
            SET worker_id = NULL, lease_expires_at = NULL
            WHERE status = 'running'
              AND worker_id IS NOT NULL
              AND lease_expires_at < ?
            RETURNING run_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(run_id,)| run_id).collect())
    }

    async fn list_overdue_runs(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT run_id FROM runs
            WHERE status = 'running'
              AND deadline IS NOT NULL
              AND deadline <= ?
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(run_id,)| run_id).collect())
    }

    async fn get_step(
        &self,
        run_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, CoreError> {
        let record = sqlx::query_as::<_, StepRecord>(
            r#"
            SELECT run_id, step_key, activity_name, attempts, state, output, error, updated_at
            FROM steps
            WHERE run_id = ? AND step_key = ?
            "#,
        )
        .bind(run_id)
        .bind(step_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO attempts (run_id, step_key, activity_name, attempt, error, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.run_id)
        .bind(&attempt.step_key)
        .bind(&attempt.activity_name)
        .bind(attempt.attempt)
        .bind(&attempt.error)
        .bind(attempt.recorded_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO steps (run_id, step_key, activity_name, attempts, error, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (run_id, step_key) DO UPDATE
            SET error = CASE
                    WHEN steps.state IS NULL AND excluded.attempts >= steps.attempts
                    THEN excluded.error
                    ELSE steps.error
                END,
                attempts = MAX(steps.attempts, excluded.attempts),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&attempt.run_id)
        .bind(&attempt.step_key)
        .bind(&attempt.activity_name)
        .bind(attempt.attempt)
        .bind(&attempt.error)
        .bind(attempt.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn settle_step(&self, step: &StepRecord) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO steps (run_id, step_key, activity_name, attempts, state, output, error,
                               updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (run_id, step_key) DO UPDATE
            SET attempts = excluded.attempts,
                state = excluded.state,
                output = excluded.output,
                error = excluded.error,
                updated_at = excluded.updated_at
            WHERE steps.state IS NULL
            "#,
        )
        .bind(&step.run_id)
        .bind(&step.step_key)
        .bind(&step.activity_name)
        .bind(step.attempts)
        .bind(&step.state)
        .bind(&step.output)
        .bind(&step.error)
        .bind(step.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_attempts(&self, run_id: &str) -> Result<Vec<AttemptRecord>, CoreError> {
        let records = sqlx::query_as::<_, AttemptRecord>(
            r#"
            SELECT id, run_id, step_key, activity_name, attempt, error, recorded_at
            FROM attempts
            WHERE run_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_open_runs(&self) -> Result<i64, CoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM runs
            WHERE status = 'running'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i64,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}
