// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler errors and their HTTP rendering.

use axum::response::{IntoResponse, Response};
use gradewise_client::ClientError;
use thiserror::Error;

use crate::responses::JsonResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Orchestration(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    /// Orchestration failures are logged by the handler and rendered without
    /// their details.
    fn into_response(self) -> Response {
        match &self {
            ApiError::MissingParameter(_) => JsonResponse::bad_request(&self.to_string()),
            ApiError::Orchestration(ClientError::RunNotFound(_)) => {
                JsonResponse::not_found(&self.to_string())
            }
            ApiError::Orchestration(_) => JsonResponse::server_error("internal server error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let missing = ApiError::MissingParameter("name").into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let not_found = ApiError::from(ClientError::RunNotFound("r-1".into())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let failed = ApiError::from(ClientError::WorkflowFailure {
            run_id: "r-1".into(),
            reason: "boom".into(),
        })
        .into_response();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let deadline = ApiError::from(ClientError::DeadlineExceeded {
            run_id: "r-1".into(),
            waited_ms: 10,
        })
        .into_response();
        assert_eq!(deadline.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
