// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON error bodies returned by the API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub success: bool,
    pub message: String,
    pub code: Option<String>,
}

impl JsonResponse {
    fn error(status: StatusCode, msg: &str, code: &str) -> Response {
        (
            status,
            Json(JsonResponse {
                status: "error".to_string(),
                success: false,
                message: msg.to_string(),
                code: Some(code.to_string()),
            }),
        )
            .into_response()
    }

    pub fn bad_request(msg: &str) -> Response {
        Self::error(StatusCode::BAD_REQUEST, msg, "BAD_REQUEST")
    }

    pub fn not_found(msg: &str) -> Response {
        Self::error(StatusCode::NOT_FOUND, msg, "NOT_FOUND")
    }

    pub fn server_error(msg: &str) -> Response {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, msg, "INTERNAL_ERROR")
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use serde_json::from_slice;

    use super::JsonResponse;

    #[tokio::test]
    async fn test_server_error_response() {
        let resp = JsonResponse::server_error("nope").into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert_eq!(json.status, "error");
        assert!(!json.success);
        assert_eq!(json.message, "nope");
        assert_eq!(json.code.as_deref(), Some("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let resp = JsonResponse::bad_request("missing name").into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
