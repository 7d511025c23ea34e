// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OrchestrationClient: start runs, describe them, await their results.

use std::sync::Arc;
use std::time::Duration;

use gradewise_core::Engine;
use gradewise_protocol::{AttemptRecord, HealthResponse, RunInfo, RunStatus, StartRunRequest};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ClientBackend, EmbeddedBackend};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Options for [`OrchestrationClient::start_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRunOptions {
    pub task_queue: String,
    /// Caller correlation key. At most one open run may carry it.
    pub workflow_id: Option<String>,
    /// Substrate-enforced limit on the whole run.
    pub execution_timeout: Option<Duration>,
}

impl StartRunOptions {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            workflow_id: None,
            execution_timeout: None,
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}

/// Client used by frontends to drive workflow runs.
///
/// Cheap to clone; create one at startup and share it.
#[derive(Clone)]
pub struct OrchestrationClient {
    backend: Arc<dyn ClientBackend>,
    long_poll: Duration,
}

impl OrchestrationClient {
    /// Create an HTTP client for the configured substrate.
    #[cfg(feature = "http")]
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let backend = crate::backend::HttpBackend::new(config)?;
        Ok(Self {
            backend: Arc::new(backend),
            long_poll: config.long_poll,
        })
    }

    /// Create an HTTP client from environment variables.
    #[cfg(feature = "http")]
    pub fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::from_env()?)
    }

    /// Client over an in-process engine.
    pub fn embedded(engine: Arc<Engine>) -> Self {
        Self::with_backend(Arc::new(EmbeddedBackend::new(engine)))
    }

    pub fn with_backend(backend: Arc<dyn ClientBackend>) -> Self {
        Self {
            backend,
            long_poll: ClientConfig::default().long_poll,
        }
    }

    /// Longest single wait request issued by [`await_result`](Self::await_result).
    pub fn with_long_poll(mut self, long_poll: Duration) -> Self {
        self.long_poll = long_poll;
        self
    }

    /// Startup probe: fails when the substrate is unreachable.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<HealthResponse> {
        let health = self.health_check().await?;
        info!(version = %health.version, open_runs = health.open_runs, "Connected to gradewise-core");
        Ok(health)
    }

    pub async fn health_check(&self) -> Result<HealthResponse> {
        self.backend.health().await
    }

    /// Enqueue a run of `workflow_type`. Does not wait for it to execute.
    #[instrument(skip(self, input, options), fields(task_queue = %options.task_queue))]
    pub async fn start_run<I: Serialize + ?Sized>(
        &self,
        workflow_type: &str,
        input: &I,
        options: StartRunOptions,
    ) -> Result<String> {
        let input = serde_json::to_value(input).map_err(|e| ClientError::Submission(e.to_string()))?;
        let request = StartRunRequest {
            workflow_type: workflow_type.to_string(),
            task_queue: options.task_queue,
            input,
            workflow_id: options.workflow_id,
            execution_timeout_ms: options.execution_timeout.map(|d| d.as_millis() as u64),
        };

        match self.backend.start_run(request).await {
            Ok(run_id) => {
                info!(run_id = %run_id, "Run started");
                Ok(run_id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to start run");
                Err(ClientError::Submission(e.to_string()))
            }
        }
    }

    /// Current state of the run, without waiting.
    #[instrument(skip(self))]
    pub async fn describe_run(&self, run_id: &str) -> Result<RunInfo> {
        let info = self
            .backend
            .describe_run(run_id)
            .await
            .map_err(|e| e.for_run(run_id))?;
        debug!(status = %info.status, "Described run");
        Ok(info)
    }

    /// Wait until the run is terminal or `timeout` passes.
    ///
    /// On timeout the run is left untouched and keeps executing.
    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn await_result(&self, run_id: &str, timeout: Duration) -> Result<Value> {
        let deadline = deadline_after(timeout);
        let deadline_exceeded = || ClientError::DeadlineExceeded {
            run_id: run_id.to_string(),
            waited_ms: timeout.as_millis() as u64,
        };

        let poll = async {
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(deadline_exceeded());
                }
                let info = self
                    .backend
                    .wait_run(run_id, remaining.min(self.long_poll))
                    .await
                    .map_err(|e| e.for_run(run_id))?;
                if let Some(outcome) = terminal_outcome(info) {
                    return outcome;
                }
                debug!("Run still open, polling again");
            }
        };

        match tokio::time::timeout_at(deadline, poll).await {
            Ok(outcome) => outcome,
            Err(_) => Err(deadline_exceeded()),
        }
    }

    /// [`await_result`](Self::await_result) decoding the output into `T`.
    pub async fn await_result_typed<T: DeserializeOwned>(
        &self,
        run_id: &str,
        timeout: Duration,
    ) -> Result<T> {
        let output = self.await_result(run_id, timeout).await?;
        Ok(serde_json::from_value(output)?)
    }

    /// Every recorded activity attempt of the run, oldest first.
    pub async fn get_history(&self, run_id: &str) -> Result<Vec<AttemptRecord>> {
        let history = self
            .backend
            .history(run_id)
            .await
            .map_err(|e| e.for_run(run_id))?;
        Ok(history.attempts)
    }
}

/// `None` while the run is open.
/// Stand-in deadline for waits too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

fn terminal_outcome(info: RunInfo) -> Option<Result<Value>> {
    let RunInfo {
        run_id,
        status,
        output,
        error,
        ..
    } = info;
    match status {
        RunStatus::Running => None,
        RunStatus::Completed => Some(Ok(output.unwrap_or(Value::Null))),
        RunStatus::Failed => Some(Err(ClientError::WorkflowFailure {
            run_id,
            reason: error.unwrap_or_else(|| "unknown error".to_string()),
        })),
        RunStatus::TimedOut => Some(Err(ClientError::WorkflowTimedOut { run_id })),
        RunStatus::Canceled => Some(Err(ClientError::WorkflowCanceled { run_id })),
    }
}
