// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gradewise-client.

use gradewise_protocol::error_codes;
use thiserror::Error;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the orchestration client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The run could not be started: substrate unreachable or request
    /// rejected. No run exists.
    #[error("failed to start run: {0}")]
    Submission(String),

    /// The run did not settle within the caller's timeout. The run itself
    /// keeps going.
    #[error("run '{run_id}' did not finish within {waited_ms}ms")]
    DeadlineExceeded { run_id: String, waited_ms: u64 },

    /// The run ended in `failed`.
    #[error("run '{run_id}' failed: {reason}")]
    WorkflowFailure { run_id: String, reason: String },

    /// The substrate timed the run out.
    #[error("run '{run_id}' exceeded its execution timeout")]
    WorkflowTimedOut { run_id: String },

    #[error("run '{run_id}' was canceled")]
    WorkflowCanceled { run_id: String },

    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Connection to gradewise-core failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Server returned an error response.
    #[error("server error [{code}]: {message}")]
    Server { code: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Attach the run id to errors about a run that does not exist.
    pub(crate) fn for_run(self, run_id: &str) -> Self {
        match self {
            ClientError::Server { code, .. } if code == error_codes::RUN_NOT_FOUND => {
                ClientError::RunNotFound(run_id.to_string())
            }
            other => other,
        }
    }

    /// Whether the run reached a terminal state other than `completed`.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            ClientError::WorkflowFailure { .. }
                | ClientError::WorkflowTimedOut { .. }
                | ClientError::WorkflowCanceled { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<gradewise_core::CoreError> for ClientError {
    fn from(err: gradewise_core::CoreError) -> Self {
        ClientError::Server {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Serialization(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_run_maps_not_found_only() {
        let err = ClientError::Server {
            code: "RUN_NOT_FOUND".to_string(),
            message: "Run 'r-1' not found".to_string(),
        };
        assert!(matches!(err.for_run("r-1"), ClientError::RunNotFound(id) if id == "r-1"));

        let err = ClientError::Server {
            code: "DATABASE_ERROR".to_string(),
            message: "disk full".to_string(),
        };
        assert!(matches!(err.for_run("r-1"), ClientError::Server { .. }));
    }

    #[test]
    fn test_display() {
        let err = ClientError::DeadlineExceeded {
            run_id: "r-1".to_string(),
            waited_ms: 1500,
        };
        assert_eq!(err.to_string(), "run 'r-1' did not finish within 1500ms");

        let err = ClientError::WorkflowFailure {
            run_id: "r-1".to_string(),
            reason: "failed to greet".to_string(),
        };
        assert_eq!(err.to_string(), "run 'r-1' failed: failed to greet");
        assert!(err.is_run_failure());
    }
}
