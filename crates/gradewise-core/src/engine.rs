// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle, task-queue leases, step store and terminal-state waiters.
//!
//! The [`Engine`] is the transport-independent heart of gradewise-core. The
//! HTTP server is a thin layer over it and embedded backends call it
//! directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gradewise_protocol as proto;
use gradewise_protocol::RunStatus;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::{
    AttemptRecord, InMemoryPersistence, Persistence, RunRecord, StepRecord,
};

/// Default lease granted on claim.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Error recorded on runs moved to `timed_out` by the sweeper.
pub const EXECUTION_TIMEOUT_ERROR: &str = "execution timeout exceeded";

/// Outcome of one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Runs whose lapsed lease was released back to the queue.
    pub requeued: usize,
    /// Runs moved to `timed_out`.
    pub timed_out: usize,
}

pub struct Engine {
    persistence: Arc<dyn Persistence>,
    lease_duration: Duration,
    /// Bumped on every terminal transition.
    terminal: watch::Sender<u64>,
    started_at: std::time::Instant,
}

impl Engine {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        let (terminal, _) = watch::channel(0);
        Self {
            persistence,
            lease_duration: DEFAULT_LEASE_DURATION,
            terminal,
            started_at: std::time::Instant::now(),
        }
    }

    /// Engine over process-local persistence.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPersistence::new()))
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Receiver that changes whenever any run reaches a terminal status.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.terminal.subscribe()
    }

    fn notify_terminal(&self) {
        self.terminal.send_modify(|generation| *generation += 1);
    }

    // ------------------------------------------------------------------
    // Client operations
    // ------------------------------------------------------------------

    #[instrument(skip(self, request), fields(workflow_type = %request.workflow_type, task_queue = %request.task_queue))]
    pub async fn start_run(&self, request: proto::StartRunRequest) -> Result<proto::StartRunResponse> {
        if request.workflow_type.trim().is_empty() {
            return Err(CoreError::validation("workflow_type", "must not be empty"));
        }
        if request.task_queue.trim().is_empty() {
            return Err(CoreError::validation("task_queue", "must not be empty"));
        }
        if request.execution_timeout_ms == Some(0) {
            return Err(CoreError::validation(
                "execution_timeout_ms",
                "must be greater than zero",
            ));
        }
        if request.workflow_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(CoreError::validation("workflow_id", "must not be blank"));
        }

        let now = Utc::now();
        let run = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: request.workflow_id,
            workflow_type: request.workflow_type,
            task_queue: request.task_queue,
            status: RunStatus::Running.as_str().to_string(),
            input: serde_json::to_string(&request.input)?,
            output: None,
            error: None,
            worker_id: None,
            lease_expires_at: None,
            claim_count: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            deadline: request
                .execution_timeout_ms
                .map(|ms| offset(now, Duration::from_millis(ms))),
        };

        self.persistence.insert_run(&run).await?;
        info!(run_id = %run.run_id, "Run started");

        Ok(proto::StartRunResponse { run_id: run.run_id })
    }

    pub async fn describe_run(&self, run_id: &str) -> Result<proto::RunInfo> {
        self.load_run(run_id).await?.to_info()
    }

    /// Describe the run once it is terminal, or after `wait` at the latest.
    pub async fn wait_for_terminal(&self, run_id: &str, wait: Duration) -> Result<proto::RunInfo> {
        // Subscribe before the first read so a transition in between is seen.
        let mut changes = self.subscribe();
        let deadline = deadline_after(wait);

        loop {
            let info = self.describe_run(run_id).await?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.describe_run(run_id).await,
            }
        }
    }

    pub async fn history(&self, run_id: &str) -> Result<proto::HistoryResponse> {
        self.load_run(run_id).await?;
        let attempts = self
            .persistence
            .list_attempts(run_id)
            .await?
            .into_iter()
            .map(proto::AttemptRecord::from)
            .collect();
        Ok(proto::HistoryResponse {
            run_id: run_id.to_string(),
            attempts,
        })
    }

    // ------------------------------------------------------------------
    // Worker operations
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn claim_run(
        &self,
        task_queue: &str,
        worker_id: &str,
    ) -> Result<Option<proto::ClaimedRun>> {
        if worker_id.trim().is_empty() {
            return Err(CoreError::validation("worker_id", "must not be empty"));
        }
        let now = Utc::now();
        let lease_expires_at = offset(now, self.lease_duration);
        let Some(run) = self
            .persistence
            .claim_next_run(task_queue, worker_id, now, lease_expires_at)
            .await?
        else {
            return Ok(None);
        };

        info!(
            run_id = %run.run_id,
            claim_count = run.claim_count,
            "Run claimed"
        );
        run.to_claimed().map(Some)
    }

    #[instrument(skip(self))]
    pub async fn heartbeat(
        &self,
        run_id: &str,
        worker_id: &str,
    ) -> Result<proto::HeartbeatResponse> {
        self.require_lease(run_id, worker_id).await?;
        let lease_expires_at = offset(Utc::now(), self.lease_duration);
        if !self
            .persistence
            .extend_lease(run_id, worker_id, lease_expires_at)
            .await?
        {
            return Err(lease_lost(run_id, worker_id));
        }
        debug!("Lease extended");
        Ok(proto::HeartbeatResponse { lease_expires_at })
    }

    pub async fn get_step(&self, run_id: &str, step_key: &str) -> Result<Option<proto::StepRecord>> {
        self.load_run(run_id).await?;
        match self.persistence.get_step(run_id, step_key).await? {
            Some(step) => step.to_proto().map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, request), fields(worker_id = %request.worker_id, attempt = request.attempt))]
    pub async fn record_attempt(
        &self,
        run_id: &str,
        step_key: &str,
        request: proto::RecordAttemptRequest,
    ) -> Result<()> {
        validate_step(step_key, &request.activity_name)?;
        if request.attempt == 0 {
            return Err(CoreError::validation("attempt", "attempts are numbered from 1"));
        }
        self.require_lease(run_id, &request.worker_id).await?;

        self.persistence
            .record_attempt(&AttemptRecord {
                id: None,
                run_id: run_id.to_string(),
                step_key: step_key.to_string(),
                activity_name: request.activity_name,
                attempt: i64::from(request.attempt),
                error: request.error,
                recorded_at: Utc::now(),
            })
            .await
    }

    /// Settle a step. Returns the authoritative record: when the step was
    /// already settled the earlier outcome wins and is returned instead.
    #[instrument(skip(self, request), fields(worker_id = %request.worker_id))]
    pub async fn save_step(
        &self,
        run_id: &str,
        step_key: &str,
        request: proto::SaveStepRequest,
    ) -> Result<proto::StepRecord> {
        validate_step(step_key, &request.activity_name)?;
        self.require_lease(run_id, &request.worker_id).await?;

        let record = StepRecord::settled(
            run_id,
            step_key,
            &request.activity_name,
            request.attempts,
            &request.outcome,
        )?;
        if self.persistence.settle_step(&record).await? {
            debug!("Step settled");
            return record.to_proto();
        }

        warn!("Step already settled, keeping recorded outcome");
        let existing = self
            .persistence
            .get_step(run_id, step_key)
            .await?
            .ok_or_else(|| CoreError::DatabaseError {
                operation: "save_step".to_string(),
                details: format!("step '{}' vanished after conflict", step_key),
            })?;
        existing.to_proto()
    }

    #[instrument(skip(self, request), fields(worker_id = %request.worker_id))]
    pub async fn complete_run(&self, run_id: &str, request: proto::CompleteRunRequest) -> Result<()> {
        self.require_lease(run_id, &request.worker_id).await?;
        let output = serde_json::to_string(&request.output)?;
        let updated = self
            .persistence
            .finish_run(
                run_id,
                Some(&request.worker_id),
                RunStatus::Completed,
                Some(&output),
                None,
                Utc::now(),
            )
            .await?;
        if !updated {
            return Err(lease_lost(run_id, &request.worker_id));
        }
        info!("Run completed");
        self.notify_terminal();
        Ok(())
    }

    #[instrument(skip(self, request), fields(worker_id = %request.worker_id))]
    pub async fn fail_run(&self, run_id: &str, request: proto::FailRunRequest) -> Result<()> {
        self.require_lease(run_id, &request.worker_id).await?;
        let updated = self
            .persistence
            .finish_run(
                run_id,
                Some(&request.worker_id),
                RunStatus::Failed,
                None,
                Some(&request.error),
                Utc::now(),
            )
            .await?;
        if !updated {
            return Err(lease_lost(run_id, &request.worker_id));
        }
        info!(error = %request.error, "Run failed");
        self.notify_terminal();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Release lapsed leases and time out overdue runs as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let requeued = self.persistence.requeue_expired_leases(now).await?;
        for run_id in &requeued {
            warn!(run_id = %run_id, "Lease expired, run returned to queue");
        }

        let mut timed_out = 0;
        for run_id in self.persistence.list_overdue_runs(now).await? {
            let updated = self
                .persistence
                .finish_run(
                    &run_id,
                    None,
                    RunStatus::TimedOut,
                    None,
                    Some(EXECUTION_TIMEOUT_ERROR),
                    now,
                )
                .await?;
            if updated {
                warn!(run_id = %run_id, "Run timed out");
                timed_out += 1;
            }
        }
        if timed_out > 0 {
            self.notify_terminal();
        }

        Ok(SweepReport {
            requeued: requeued.len(),
            timed_out,
        })
    }

    pub async fn health(&self) -> Result<proto::HealthResponse> {
        let healthy = self.persistence.health_check_db().await?;
        let open_runs = self.persistence.count_open_runs().await?;
        Ok(proto::HealthResponse {
            healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            open_runs: open_runs.max(0) as u64,
        })
    }

    // ------------------------------------------------------------------

    async fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        self.persistence
            .get_run(run_id)
            .await?
            .ok_or_else(|| CoreError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// The run must be open and leased to `worker_id`.
    async fn require_lease(&self, run_id: &str, worker_id: &str) -> Result<RunRecord> {
        let run = self.load_run(run_id).await?;
        if run.worker_id.as_deref() != Some(worker_id) {
            return Err(lease_lost(run_id, worker_id));
        }
        let status = run.status()?;
        if status.is_terminal() {
            return Err(CoreError::InvalidRunState {
                run_id: run_id.to_string(),
                expected: RunStatus::Running.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }
        Ok(run)
    }
}

fn lease_lost(run_id: &str, worker_id: &str) -> CoreError {
    CoreError::LeaseLost {
        run_id: run_id.to_string(),
        worker_id: worker_id.to_string(),
    }
}

fn validate_step(step_key: &str, activity_name: &str) -> Result<()> {
    if activity_name.trim().is_empty() {
        return Err(CoreError::validation("activity_name", "must not be empty"));
    }
    match step_key.split_once(':') {
        Some((sequence, name)) if sequence.parse::<u32>().is_ok() && name == activity_name => {
            Ok(())
        }
        _ => Err(CoreError::validation(
            "step_key",
            format!("expected '<sequence>:{}', got '{}'", activity_name, step_key),
        )),
    }
}

/// Stand-in deadline for waits too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(wait: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE)
}

fn offset(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_request(input: serde_json::Value) -> proto::StartRunRequest {
        proto::StartRunRequest {
            workflow_type: "InteractWithMe".to_string(),
            task_queue: "gradewise-backend".to_string(),
            input,
            workflow_id: None,
            execution_timeout_ms: None,
        }
    }

    #[test]
    fn test_validate_step_key() {
        assert!(validate_step("1:Greet", "Greet").is_ok());
        assert!(validate_step("12:SayGoodbye", "SayGoodbye").is_ok());
        assert!(validate_step("Greet", "Greet").is_err());
        assert!(validate_step("x:Greet", "Greet").is_err());
        assert!(validate_step("1:Greet", "SayGoodbye").is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_blank_fields() {
        let engine = Engine::in_memory();

        let mut request = start_request(json!("Sam"));
        request.task_queue = " ".to_string();
        assert!(matches!(
            engine.start_run(request).await,
            Err(CoreError::ValidationError { .. })
        ));

        let mut request = start_request(json!("Sam"));
        request.execution_timeout_ms = Some(0);
        assert!(matches!(
            engine.start_run(request).await,
            Err(CoreError::ValidationError { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_returns_once_terminal() {
        let engine = Arc::new(Engine::in_memory());
        let run_id = engine.start_run(start_request(json!("Sam"))).await.unwrap().run_id;
        engine
            .claim_run("gradewise-backend", "w-1")
            .await
            .unwrap()
            .unwrap();

        let waiter = {
            let engine = engine.clone();
            let run_id = run_id.clone();
            tokio::spawn(async move {
                engine
                    .wait_for_terminal(&run_id, Duration::from_secs(10))
                    .await
            })
        };

        engine
            .complete_run(
                &run_id,
                proto::CompleteRunRequest {
                    worker_id: "w-1".to_string(),
                    output: json!("done"),
                },
            )
            .await
            .unwrap();

        let info = waiter.await.unwrap().unwrap();
        assert_eq!(info.status, RunStatus::Completed);
        assert_eq!(info.output, Some(json!("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_budget() {
        let engine = Engine::in_memory();
        let run_id = engine.start_run(start_request(json!("Sam"))).await.unwrap().run_id;

        let info = engine
            .wait_for_terminal(&run_id, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(info.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_complete_requires_lease() {
        let engine = Engine::in_memory();
        let run_id = engine.start_run(start_request(json!("Sam"))).await.unwrap().run_id;

        let err = engine
            .complete_run(
                &run_id,
                proto::CompleteRunRequest {
                    worker_id: "w-1".to_string(),
                    output: json!("done"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::LeaseLost { .. }));
    }
}
