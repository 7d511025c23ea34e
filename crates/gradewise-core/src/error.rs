// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gradewise-core.
//!
//! Provides a unified error type that maps to HTTP error responses.

use std::fmt;

use gradewise_protocol::{ErrorBody, error_codes};

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Run was not found.
    RunNotFound {
        /// The run ID that was not found.
        run_id: String,
    },

    /// An open run already carries this workflow id.
    RunAlreadyStarted {
        /// The conflicting workflow id.
        workflow_id: String,
    },

    /// The caller does not hold the lease on the run.
    LeaseLost {
        /// The run ID.
        run_id: String,
        /// The worker that attempted the write.
        worker_id: String,
    },

    /// Run is in an invalid state for the requested operation.
    InvalidRunState {
        /// The run ID.
        run_id: String,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Convert this error to the JSON error body sent over HTTP.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RunNotFound { .. } => error_codes::RUN_NOT_FOUND,
            Self::RunAlreadyStarted { .. } => error_codes::RUN_ALREADY_STARTED,
            Self::LeaseLost { .. } => error_codes::LEASE_LOST,
            Self::InvalidRunState { .. } => error_codes::INVALID_RUN_STATE,
            Self::ValidationError { .. } => error_codes::VALIDATION_ERROR,
            Self::DatabaseError { .. } => error_codes::DATABASE_ERROR,
        }
    }

    /// HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RunNotFound { .. } => 404,
            Self::RunAlreadyStarted { .. } | Self::LeaseLost { .. } | Self::InvalidRunState { .. } => {
                409
            }
            Self::ValidationError { .. } => 400,
            Self::DatabaseError { .. } => 500,
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotFound { run_id } => {
                write!(f, "Run '{}' not found", run_id)
            }
            Self::RunAlreadyStarted { workflow_id } => {
                write!(
                    f,
                    "An open run with workflow id '{}' already exists",
                    workflow_id
                )
            }
            Self::LeaseLost { run_id, worker_id } => {
                write!(
                    f,
                    "Worker '{}' does not hold the lease on run '{}'",
                    worker_id, run_id
                )
            }
            Self::InvalidRunState {
                run_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Run '{}' is in invalid state: expected '{}', got '{}'",
                    run_id, expected, actual
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
