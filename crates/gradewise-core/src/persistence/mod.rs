// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for gradewise-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod memory;
pub mod sqlite;

pub use self::memory::InMemoryPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_protocol as proto;
use gradewise_protocol::RunStatus;

use crate::error::CoreError;

/// Run record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RunRecord {
    /// Unique identifier for the run.
    pub run_id: String,
    /// Optional caller-supplied correlation key.
    pub workflow_id: Option<String>,
    /// Registered workflow type name.
    pub workflow_type: String,
    /// Task queue the run is dispatched on.
    pub task_queue: String,
    /// Current status (running, completed, failed, timed_out, canceled).
    pub status: String,
    /// JSON-encoded input payload.
    pub input: String,
    /// JSON-encoded output, present once completed.
    pub output: Option<String>,
    /// Failure reason, present once failed or timed out.
    pub error: Option<String>,
    /// Current lease holder.
    pub worker_id: Option<String>,
    /// When the current lease lapses.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Number of times the run was claimed.
    pub claim_count: i64,
    /// When the run was started.
    pub created_at: DateTime<Utc>,
    /// When the run was first claimed.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Execution deadline, if the run was started with a timeout.
    pub deadline: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn status(&self) -> Result<RunStatus, CoreError> {
        self.status
            .parse::<RunStatus>()
            .map_err(|e| CoreError::DatabaseError {
                operation: "decode_status".to_string(),
                details: e.to_string(),
            })
    }

    /// Convert to the wire representation.
    pub fn to_info(&self) -> Result<proto::RunInfo, CoreError> {
        let output = match &self.output {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };
        Ok(proto::RunInfo {
            run_id: self.run_id.clone(),
            workflow_id: self.workflow_id.clone(),
            workflow_type: self.workflow_type.clone(),
            task_queue: self.task_queue.clone(),
            status: self.status()?,
            input: serde_json::from_str(&self.input)?,
            output,
            error: self.error.clone(),
            worker_id: self.worker_id.clone(),
            claim_count: self.claim_count.max(0) as u32,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            deadline: self.deadline,
        })
    }

    pub fn to_claimed(&self) -> Result<proto::ClaimedRun, CoreError> {
        let lease_expires_at = self.lease_expires_at.ok_or_else(|| CoreError::InvalidRunState {
            run_id: self.run_id.clone(),
            expected: "leased".to_string(),
            actual: "queued".to_string(),
        })?;
        Ok(proto::ClaimedRun {
            run_id: self.run_id.clone(),
            workflow_type: self.workflow_type.clone(),
            input: serde_json::from_str(&self.input)?,
            claim_count: self.claim_count.max(0) as u32,
            lease_expires_at,
        })
    }
}

/// Step record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StepRecord {
    /// Run this step belongs to.
    pub run_id: String,
    /// `"{sequence}:{activity_name}"`.
    pub step_key: String,
    /// Activity invoked by this step.
    pub activity_name: String,
    /// Attempts made so far.
    pub attempts: i64,
    /// `completed`, `failed`, or NULL while unsettled.
    pub state: Option<String>,
    /// JSON-encoded output of a completed step.
    pub output: Option<String>,
    /// Final error of a failed step, or the latest attempt error while
    /// unsettled.
    pub error: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

pub const STEP_COMPLETED: &str = "completed";
pub const STEP_FAILED: &str = "failed";

impl StepRecord {
    /// Build a settled record from a wire outcome.
    pub fn settled(
        run_id: &str,
        step_key: &str,
        activity_name: &str,
        attempts: u32,
        outcome: &proto::StepOutcome,
    ) -> Result<Self, CoreError> {
        let (state, output, error) = match outcome {
            proto::StepOutcome::Completed { output } => {
                (STEP_COMPLETED, Some(serde_json::to_string(output)?), None)
            }
            proto::StepOutcome::Failed { error } => (STEP_FAILED, None, Some(error.clone())),
        };
        Ok(Self {
            run_id: run_id.to_string(),
            step_key: step_key.to_string(),
            activity_name: activity_name.to_string(),
            attempts: i64::from(attempts),
            state: Some(state.to_string()),
            output,
            error,
            updated_at: Utc::now(),
        })
    }

    pub fn to_proto(&self) -> Result<proto::StepRecord, CoreError> {
        let outcome = match self.state.as_deref() {
            None => None,
            Some(STEP_COMPLETED) => {
                let output = match &self.output {
                    Some(raw) => serde_json::from_str(raw)?,
                    None => serde_json::Value::Null,
                };
                Some(proto::StepOutcome::Completed { output })
            }
            Some(STEP_FAILED) => Some(proto::StepOutcome::Failed {
                error: self.error.clone().unwrap_or_default(),
            }),
            Some(other) => {
                return Err(CoreError::DatabaseError {
                    operation: "decode_step".to_string(),
                    details: format!("unknown step state '{}'", other),
                });
            }
        };
        Ok(proto::StepRecord {
            step_key: self.step_key.clone(),
            activity_name: self.activity_name.clone(),
            attempts: self.attempts.max(0) as u32,
            last_error: match outcome {
                None => self.error.clone(),
                Some(_) => None,
            },
            outcome,
        })
    }
}

/// Attempt record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AttemptRecord {
    /// Database primary key (None when inserting new attempts).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Run this attempt belongs to.
    pub run_id: String,
    /// Step the attempt was made for.
    pub step_key: String,
    /// Activity invoked.
    pub activity_name: String,
    /// 1-based attempt number.
    pub attempt: i64,
    /// Error of a failed attempt; NULL for the successful one.
    pub error: Option<String>,
    /// When the attempt was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl From<AttemptRecord> for proto::AttemptRecord {
    fn from(record: AttemptRecord) -> Self {
        proto::AttemptRecord {
            step_key: record.step_key,
            activity_name: record.activity_name,
            attempt: record.attempt.max(0) as u32,
            error: record.error,
            recorded_at: record.recorded_at,
        }
    }
}

/// Storage backend of the execution substrate.
///
/// Conditional writes (`claim_next_run`, `extend_lease`, `finish_run`,
/// `settle_step`) must be atomic: they are the only guard against two
/// workers acting on the same run.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert a new run. Fails with `RunAlreadyStarted` when an open run
    /// already carries the same workflow id.
    async fn insert_run(&self, run: &RunRecord) -> Result<(), CoreError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CoreError>;

    /// Lease the oldest queued run on `task_queue` to `worker_id`.
    async fn claim_next_run(
        &self,
        task_queue: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<RunRecord>, CoreError>;

    /// Push out the lease of an open run held by `worker_id`. Returns false
    /// when the worker no longer holds it.
    async fn extend_lease(
        &self,
        run_id: &str,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    /// Move an open run to a terminal status. With `worker_id` set the write
    /// only applies while that worker holds the lease. Returns false when
    /// nothing was updated.
    async fn finish_run(
        &self,
        run_id: &str,
        worker_id: Option<&str>,
        status: RunStatus,
        output: Option<&str>,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    /// Release every lease that lapsed before `now`; returns the run ids.
    async fn requeue_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError>;

    /// Open runs whose deadline is at or before `now`.
    async fn list_overdue_runs(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError>;

    async fn get_step(&self, run_id: &str, step_key: &str)
    -> Result<Option<StepRecord>, CoreError>;

    /// Append an attempt and raise the step's attempt counter to at least
    /// `attempt.attempt`.
    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), CoreError>;

    /// Settle a step. First write wins: returns false when the step was
    /// already settled.
    async fn settle_step(&self, step: &StepRecord) -> Result<bool, CoreError>;

    /// Attempts of a run in recording order.
    async fn list_attempts(&self, run_id: &str) -> Result<Vec<AttemptRecord>, CoreError>;

    async fn count_open_runs(&self) -> Result<i64, CoreError>;

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
