// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use gradewise_protocol::error_codes;
use thiserror::Error;

/// Errors that can occur talking to gradewise-core.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to gradewise-core failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Server returned an error response
    #[error("server error: {code} - {message}")]
    Server {
        /// Error code from the server
        code: String,
        /// Error message from the server
        message: String,
    },

    /// The worker no longer holds the run (lease expired or run already
    /// terminal). The run must be abandoned without reporting.
    #[error("lease lost: {0}")]
    LeaseLost(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected response from server
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl SdkError {
    /// Build from a server error code, folding ownership errors into
    /// [`SdkError::LeaseLost`].
    pub fn from_server(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        match code.as_str() {
            error_codes::LEASE_LOST | error_codes::INVALID_RUN_STATE => SdkError::LeaseLost(message),
            _ => SdkError::Server { code, message },
        }
    }

    pub fn is_lease_lost(&self) -> bool {
        matches!(self, SdkError::LeaseLost(_))
    }

    /// Whether the same call may succeed if repeated unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            SdkError::Connection(_) | SdkError::UnexpectedResponse(_) => true,
            SdkError::Server { code, .. } => code == error_codes::DATABASE_ERROR,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<gradewise_core::CoreError> for SdkError {
    fn from(err: gradewise_core::CoreError) -> Self {
        SdkError::from_server(err.error_code(), err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SdkError::Serialization(err.to_string())
        } else {
            SdkError::Connection(err.to_string())
        }
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_core::CoreError;

    #[test]
    fn test_ownership_codes_become_lease_lost() {
        assert!(SdkError::from_server("LEASE_LOST", "gone").is_lease_lost());
        assert!(SdkError::from_server("INVALID_RUN_STATE", "timed out").is_lease_lost());
        assert!(!SdkError::from_server("RUN_NOT_FOUND", "missing").is_lease_lost());
    }

    #[test]
    fn test_transient_errors() {
        assert!(SdkError::Connection("reset".into()).is_transient());
        assert!(SdkError::from_server("DATABASE_ERROR", "locked").is_transient());
        assert!(!SdkError::from_server("LEASE_LOST", "gone").is_transient());
        assert!(!SdkError::from_server("VALIDATION_ERROR", "bad").is_transient());
        assert!(!SdkError::Serialization("eof".into()).is_transient());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: SdkError = CoreError::RunNotFound {
            run_id: "r-1".to_string(),
        }
        .into();
        match err {
            SdkError::Server { code, message } => {
                assert_eq!(code, "RUN_NOT_FOUND");
                assert!(message.contains("r-1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
