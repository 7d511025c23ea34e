// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use gradewise_client::StartRunOptions;
use gradewise_protocol::RunInfo;
use gradewise_workflows::{TASK_QUEUE, WORKFLOW_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, error, info, instrument, warn};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn root() -> &'static str {
    "Hello, World!"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy` or `degraded`
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub substrate: SubstrateHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubstrateHealth {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 503 while the substrate is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let (code, status, substrate) = match state.client.health_check().await {
        Ok(health) => (
            StatusCode::OK,
            "healthy",
            SubstrateHealth {
                connected: true,
                version: Some(health.version),
                error: None,
            },
        ),
        Err(e) => {
            warn!(error = %e, "Substrate health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "degraded",
                SubstrateHealth {
                    connected: false,
                    version: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            timestamp: Utc::now(),
            substrate,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct GreetQuery {
    pub name: Option<String>,
}

/// Runs `InteractWithMe` for `name` and returns its chat log.
///
/// Submission is not retried. Any failure to start or settle the run within
/// the configured wait is a 500.
#[instrument(skip(state, query), fields(run_id = tracing::field::Empty))]
pub async fn greet(
    State(state): State<AppState>,
    Query(query): Query<GreetQuery>,
) -> Result<Json<String>> {
    let name = query.name.ok_or(ApiError::MissingParameter("name"))?;
    let client = &state.client;

    let run_id = client
        .start_run(WORKFLOW_TYPE, &name, StartRunOptions::new(TASK_QUEUE))
        .await
        .inspect_err(|e| error!(error = %e, "Unable to start run"))?;
    Span::current().record("run_id", run_id.as_str());

    match client.describe_run(&run_id).await {
        Ok(info) => debug!(status = %info.status, "Run submitted"),
        Err(e) => warn!(error = %e, "Unable to describe run"),
    }

    let chat_log: String = client
        .await_result_typed(&run_id, state.await_timeout)
        .await
        .inspect_err(|e| error!(error = %e, "Unable to get run result"))?;

    info!("Run completed");
    Ok(Json(chat_log))
}

pub async fn run_info(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunInfo>> {
    Ok(Json(state.client.describe_run(&run_id).await?))
}

pub async fn counter(State(state): State<AppState>) -> Json<i64> {
    Json(state.counter())
}

pub async fn counter_add(State(state): State<AppState>) -> Json<i64> {
    Json(state.increment_counter())
}
