// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON message types exchanged with gradewise-core.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Run status
// ============================================================================

/// Lifecycle status of a workflow run.
///
/// A run is created `Running` (queued or leased) and moves to exactly one
/// terminal status. Terminal runs are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Canceled,
}

impl RunStatus {
    /// Storage / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown run status: {0}")]
pub struct UnknownRunStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownRunStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "timed_out" => Ok(RunStatus::TimedOut),
            "canceled" => Ok(RunStatus::Canceled),
            other => Err(UnknownRunStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Client-facing messages
// ============================================================================

/// Body of `POST /v1/runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunRequest {
    pub workflow_type: String,
    pub task_queue: String,
    #[serde(default)]
    pub input: Value,
    /// Optional caller-supplied correlation key. At most one open run may
    /// carry a given workflow id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Whole-run execution timeout. The run is moved to `timed_out` once
    /// it elapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: String,
}

/// Snapshot of a run as returned by describe and wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub workflow_id: Option<String>,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: RunStatus,
    pub input: Value,
    /// Present only when `status` is `completed`.
    pub output: Option<Value>,
    /// Present only when `status` is `failed` or `timed_out`.
    pub error: Option<String>,
    /// Current lease holder; `None` while queued.
    pub worker_id: Option<String>,
    pub claim_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Query string of `GET /v1/runs/{run_id}/wait`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitQuery {
    /// How long the server may hold the request open. Zero means "describe".
    #[serde(default)]
    pub wait_ms: u64,
}

/// One recorded activity attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub step_key: String,
    pub activity_name: String,
    pub attempt: u32,
    /// `None` for the successful attempt.
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub run_id: String,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_ms: u64,
    pub open_runs: u64,
}

/// Error payload returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Worker-facing messages
// ============================================================================

/// Body of `POST /v1/queues/{task_queue}/claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResponse {
    /// `None` when the queue had nothing to hand out.
    pub run: Option<ClaimedRun>,
}

/// A run leased to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedRun {
    pub run_id: String,
    pub workflow_type: String,
    pub input: Value,
    /// 1 on the first claim, greater on re-execution after a lost lease.
    pub claim_count: u32,
    pub lease_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub lease_expires_at: DateTime<Utc>,
}

/// Settled outcome of one logical activity invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { output: Value },
    Failed { error: String },
}

/// Durable record of a step, keyed by `"{sequence}:{activity_name}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_key: String,
    pub activity_name: String,
    /// Number of attempts made so far.
    pub attempts: u32,
    /// `None` while the step is still being retried.
    pub outcome: Option<StepOutcome>,
    /// Error of the latest recorded attempt of an unsettled step; `None`
    /// when that attempt succeeded or none was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StepRecord {
    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLookupResponse {
    pub step: Option<StepRecord>,
}

/// Body of `POST /v1/runs/{run_id}/steps/{step_key}/attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttemptRequest {
    pub worker_id: String,
    pub activity_name: String,
    pub attempt: u32,
    pub error: Option<String>,
}

/// Body of `PUT /v1/runs/{run_id}/steps/{step_key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveStepRequest {
    pub worker_id: String,
    pub activity_name: String,
    pub attempts: u32,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRunRequest {
    pub worker_id: String,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailRunRequest {
    pub worker_id: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_wire_names() {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::TimedOut,
            RunStatus::Canceled,
        ] {
            let encoded = serde_json::to_value(status).unwrap();
            assert_eq!(encoded, json!(status.as_str()));
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_only_running_is_open() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_step_outcome_is_tagged_by_state() {
        let completed = StepOutcome::Completed {
            output: json!("Hello, Sam!"),
        };
        assert_eq!(
            serde_json::to_value(&completed).unwrap(),
            json!({"state": "completed", "output": "Hello, Sam!"})
        );

        let failed: StepOutcome =
            serde_json::from_value(json!({"state": "failed", "error": "boom"})).unwrap();
        assert_eq!(
            failed,
            StepOutcome::Failed {
                error: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_start_request_optional_fields_default() {
        let req: StartRunRequest = serde_json::from_value(json!({
            "workflow_type": "InteractWithMe",
            "task_queue": "gradewise-backend",
            "input": "Sam"
        }))
        .unwrap();
        assert_eq!(req.workflow_id, None);
        assert_eq!(req.execution_timeout_ms, None);

        let encoded = serde_json::to_value(&req).unwrap();
        assert!(encoded.get("workflow_id").is_none());
    }
}
