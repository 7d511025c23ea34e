// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence, used when no database URL is configured and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_protocol::RunStatus;
use tokio::sync::Mutex;

use super::{AttemptRecord, Persistence, RunRecord, StepRecord};
use crate::error::CoreError;

#[derive(Default)]
struct State {
    runs: HashMap<String, RunRecord>,
    // (run_id, step_key) -> step
    steps: HashMap<(String, String), StepRecord>,
    attempts: Vec<AttemptRecord>,
    next_attempt_id: i64,
}

/// Process-local persistence backed by a single mutex-guarded state.
#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<State>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_open(run: &RunRecord) -> bool {
    run.status == RunStatus::Running.as_str()
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn insert_run(&self, run: &RunRecord) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if let Some(workflow_id) = &run.workflow_id {
            let taken = state
                .runs
                .values()
                .any(|r| is_open(r) && r.workflow_id.as_ref() == Some(workflow_id));
            if taken {
                return Err(CoreError::RunAlreadyStarted {
                    workflow_id: workflow_id.clone(),
                });
            }
        }
        if state.runs.contains_key(&run.run_id) {
            return Err(CoreError::DatabaseError {
                operation: "insert_run".to_string(),
                details: format!("duplicate run id '{}'", run.run_id),
            });
        }
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CoreError> {
        Ok(self.state.lock().await.runs.get(run_id).cloned())
    }

    async fn claim_next_run(
        &self,
        task_queue: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<RunRecord>, CoreError> {
        let mut state = self.state.lock().await;
        let next = state
            .runs
            .values()
            .filter(|r| r.task_queue == task_queue && is_open(r) && r.worker_id.is_none())
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.run_id.cmp(&b.run_id))
            })
            .map(|r| r.run_id.clone());

        let Some(run_id) = next else {
            return Ok(None);
        };
        let Some(run) = state.runs.get_mut(&run_id) else {
            return Ok(None);
        };
        run.worker_id = Some(worker_id.to_string());
        run.lease_expires_at = Some(lease_expires_at);
        run.claim_count += 1;
        run.started_at.get_or_insert(now);
        Ok(Some(run.clone()))
    }

    async fn extend_lease(
        &self,
        run_id: &str,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        match state.runs.get_mut(run_id) {
            Some(run) if is_open(run) && run.worker_id.as_deref() == Some(worker_id) => {
                run.lease_expires_at = Some(lease_expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
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
        let mut state = self.state.lock().await;
        let Some(run) = state.runs.get_mut(run_id) else {
            return Ok(false);
        };
        if !is_open(run) {
            return Ok(false);
        }
        if let Some(worker_id) = worker_id
            && run.worker_id.as_deref() != Some(worker_id)
        {
            return Ok(false);
        }
        run.status = status.as_str().to_string();
        run.output = output.map(str::to_string);
        run.error = error.map(str::to_string);
        run.finished_at = Some(finished_at);
        run.lease_expires_at = None;
        Ok(true)
    }

    async fn requeue_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let mut state = self.state.lock().await;
        let mut requeued = Vec::new();
        for run in state.runs.values_mut() {
            let expired = run.lease_expires_at.is_some_and(|at| at < now);
            if is_open(run) && run.worker_id.is_some() && expired {
                run.worker_id = None;
                run.lease_expires_at = None;
                requeued.push(run.run_id.clone());
            }
        }
        Ok(requeued)
    }

    async fn list_overdue_runs(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .values()
            .filter(|r| is_open(r) && r.deadline.is_some_and(|d| d <= now))
            .map(|r| r.run_id.clone())
            .collect())
    }

    async fn get_step(
        &self,
        run_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .steps
            .get(&(run_id.to_string(), step_key.to_string()))
            .cloned())
    }

    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.next_attempt_id += 1;
        let mut stored = attempt.clone();
        stored.id = Some(state.next_attempt_id);
        state.attempts.push(stored);

        let key = (attempt.run_id.clone(), attempt.step_key.clone());
        let step = state.steps.entry(key).or_insert_with(|| StepRecord {
            run_id: attempt.run_id.clone(),
            step_key: attempt.step_key.clone(),
            activity_name: attempt.activity_name.clone(),
            attempts: 0,
            state: None,
            output: None,
            error: None,
            updated_at: attempt.recorded_at,
        });
        if step.state.is_none() && attempt.attempt >= step.attempts {
            step.error = attempt.error.clone();
        }
        step.attempts = step.attempts.max(attempt.attempt);
        step.updated_at = attempt.recorded_at;
        Ok(())
    }

    async fn settle_step(&self, step: &StepRecord) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let key = (step.run_id.clone(), step.step_key.clone());
        match state.steps.get(&key) {
            Some(existing) if existing.state.is_some() => Ok(false),
            _ => {
                state.steps.insert(key, step.clone());
                Ok(true)
            }
        }
    }

    async fn list_attempts(&self, run_id: &str) -> Result<Vec<AttemptRecord>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn count_open_runs(&self) -> Result<i64, CoreError> {
        let state = self.state.lock().await;
        Ok(state.runs.values().filter(|r| is_open(r)).count() as i64)
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}
