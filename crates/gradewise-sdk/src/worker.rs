// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task-queue worker.
//!
//! The worker polls one task queue, leases runs, executes the registered
//! workflow for each, and reports the outcome. Runs execute concurrently up
//! to `max_concurrent_runs`; each holds its lease alive with a heartbeat task.
//!
//! A run is abandoned without a report when the lease is lost or the
//! substrate stays unreachable through the retries of a step call. The
//! substrate hands it to another worker once the lease expires, and replay
//! picks up from the recorded steps.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use gradewise_protocol::{ClaimedRun, HealthResponse};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity::ActivityRegistry;
use crate::backend::{SdkBackend, retry_transient};
use crate::config::SdkConfig;
use crate::context::WorkflowContext;
use crate::error::Result;
use crate::retry::ActivityOptions;
use crate::workflow::{WorkflowError, WorkflowRegistry};

/// Polls a task queue and executes the runs it leases.
pub struct Worker {
    task_queue: String,
    poll_interval: Duration,
    max_concurrent_runs: usize,
    executor: RunExecutor,
}

/// State shared by every run a worker executes.
#[derive(Clone)]
struct RunExecutor {
    backend: Arc<dyn SdkBackend>,
    worker_id: String,
    workflows: Arc<WorkflowRegistry>,
    activities: Arc<ActivityRegistry>,
    activity_options: ActivityOptions,
    heartbeat_interval: Option<Duration>,
}

impl Worker {
    pub fn new(
        backend: Arc<dyn SdkBackend>,
        config: &SdkConfig,
        task_queue: impl Into<String>,
        workflows: Arc<WorkflowRegistry>,
        activities: Arc<ActivityRegistry>,
    ) -> Self {
        Self {
            task_queue: task_queue.into(),
            poll_interval: config.poll_interval(),
            max_concurrent_runs: config.max_concurrent_runs.max(1),
            executor: RunExecutor {
                backend,
                worker_id: config.worker_id.clone(),
                workflows,
                activities,
                activity_options: ActivityOptions::default(),
                heartbeat_interval: config.heartbeat_interval(),
            },
        }
    }

    /// Default options for every activity invocation of every run.
    pub fn with_activity_options(mut self, options: ActivityOptions) -> Self {
        self.executor.activity_options = options;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.executor.worker_id
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Probe the substrate. Workers call this once at startup.
    pub async fn check_connection(&self) -> Result<HealthResponse> {
        self.executor.backend.health().await
    }

    /// Poll until `shutdown` is cancelled, then wait for in-flight runs.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_runs));
        let mut in_flight = JoinSet::new();

        info!(
            worker_id = %self.executor.worker_id,
            task_queue = %self.task_queue,
            max_concurrent_runs = self.max_concurrent_runs,
            "Worker started"
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = tokio::select! {
                _ = shutdown.cancelled() => break,
                claimed = self.executor.backend.claim(&self.task_queue, &self.executor.worker_id) => claimed,
            };

            match claimed {
                Ok(Some(run)) => {
                    info!(
                        run_id = %run.run_id,
                        workflow_type = %run.workflow_type,
                        claim_count = run.claim_count,
                        "Claimed run"
                    );
                    let executor = self.executor.clone();
                    in_flight.spawn(async move {
                        executor.execute(run).await;
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => {
                    drop(permit);
                }
                Err(e) => {
                    drop(permit);
                    warn!(task_queue = %self.task_queue, error = %e, "Failed to claim run");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(in_flight = in_flight.len(), "Worker stopping, draining in-flight runs");
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!(worker_id = %self.executor.worker_id, "Worker stopped");
        Ok(())
    }
}

impl RunExecutor {
    async fn execute(self, run: ClaimedRun) {
        let run_id = run.run_id.clone();

        let Some(workflow) = self.workflows.get(&run.workflow_type) else {
            let message = format!("workflow type '{}' is not registered", run.workflow_type);
            warn!(run_id = %run_id, "{}", message);
            self.report_failure(&run_id, &message).await;
            return;
        };

        let lease_lost = CancellationToken::new();
        let heartbeat = self
            .heartbeat_interval
            .map(|interval| self.spawn_heartbeat(run_id.clone(), interval, lease_lost.clone()));

        let ctx = WorkflowContext::new(
            run_id.clone(),
            self.worker_id.clone(),
            self.backend.clone(),
            self.activities.clone(),
            self.activity_options.clone(),
        );
        let input = run.input;
        let mut task = tokio::spawn(async move { workflow.run(ctx, input).await });

        let outcome = tokio::select! {
            joined = &mut task => Some(joined),
            _ = lease_lost.cancelled() => {
                task.abort();
                None
            }
        };

        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }

        match outcome {
            None => {
                warn!(run_id = %run_id, "Lease lost, abandoning run");
            }
            Some(Ok(Ok(output))) => match retry_transient("complete", &run_id, || {
                self.backend.complete(&run_id, &self.worker_id, output.clone())
            })
            .await
            {
                Ok(()) => info!(run_id = %run_id, "Run completed"),
                Err(e) if e.is_lease_lost() => {
                    warn!(run_id = %run_id, error = %e, "Lease lost before completion was recorded")
                }
                Err(e) => error!(run_id = %run_id, error = %e, "Failed to report completion"),
            },
            Some(Ok(Err(WorkflowError::LeaseLost(message)))) => {
                warn!(run_id = %run_id, error = %message, "Lease lost, abandoning run");
            }
            Some(Ok(Err(WorkflowError::Unavailable(message)))) => {
                warn!(
                    run_id = %run_id,
                    error = %message,
                    "Substrate unavailable, abandoning run until its lease expires"
                );
            }
            Some(Ok(Err(e))) => {
                warn!(run_id = %run_id, error = %e, "Run failed");
                self.report_failure(&run_id, &e.to_string()).await;
            }
            Some(Err(join_error)) if join_error.is_panic() => {
                let message = format!("workflow panicked: {}", panic_message(join_error.into_panic()));
                error!(run_id = %run_id, "{}", message);
                self.report_failure(&run_id, &message).await;
            }
            Some(Err(join_error)) => {
                warn!(run_id = %run_id, error = %join_error, "Workflow task cancelled");
            }
        }
    }

    async fn report_failure(&self, run_id: &str, message: &str) {
        match retry_transient("fail", run_id, || self.backend.fail(run_id, &self.worker_id, message)).await {
            Ok(()) => debug!(run_id = %run_id, "Run failure recorded"),
            Err(e) if e.is_lease_lost() => {
                warn!(run_id = %run_id, error = %e, "Lease lost before failure was recorded")
            }
            Err(e) => error!(run_id = %run_id, error = %e, "Failed to report failure"),
        }
    }

    fn spawn_heartbeat(
        &self,
        run_id: String,
        interval: Duration,
        lease_lost: CancellationToken,
    ) -> JoinHandle<()> {
        let backend = self.backend.clone();
        let worker_id = self.worker_id.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; the claim itself started the lease.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match backend.heartbeat(&run_id, &worker_id).await {
                    Ok(expires_at) => {
                        debug!(run_id = %run_id, lease_expires_at = %expires_at, "Heartbeat sent")
                    }
                    Err(e) if e.is_lease_lost() => {
                        warn!(run_id = %run_id, error = %e, "Heartbeat rejected");
                        lease_lost.cancel();
                        return;
                    }
                    Err(e) => warn!(run_id = %run_id, error = %e, "Failed to send heartbeat"),
                }
            }
        })
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Run task terminated abnormally");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
