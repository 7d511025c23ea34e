// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP/JSON server for gradewise-core.
//!
//! Every handler is a thin adapter over [`Engine`]; errors are rendered as
//! [`ErrorBody`](gradewise_protocol::ErrorBody) with the status from
//! [`CoreError::http_status`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gradewise_protocol as proto;
use gradewise_protocol::paths;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::Engine;
use crate::error::CoreError;

/// Upper bound on a single long-poll request.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

type ApiResult<T> = Result<Json<T>, CoreError>;

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_body())).into_response()
    }
}

/// Build the substrate router.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health))
        .route(paths::RUNS, post(start_run))
        .route(paths::RUN, get(describe_run))
        .route(paths::RUN_WAIT, get(wait_run))
        .route(paths::RUN_HISTORY, get(history))
        .route(paths::QUEUE_CLAIM, post(claim))
        .route(paths::RUN_HEARTBEAT, post(heartbeat))
        .route(paths::RUN_STEP, get(get_step).put(save_step))
        .route(paths::RUN_STEP_ATTEMPTS, post(record_attempt))
        .route(paths::RUN_COMPLETE, post(complete_run))
        .route(paths::RUN_FAIL, post(fail_run))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, engine, shutdown).await
}

/// Serve on an already bound listener (tests bind port 0).
pub async fn serve_listener(
    listener: TcpListener,
    engine: Arc<Engine>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn health(State(engine): State<Arc<Engine>>) -> ApiResult<proto::HealthResponse> {
    Ok(Json(engine.health().await?))
}

async fn start_run(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<proto::StartRunRequest>,
) -> Result<(StatusCode, Json<proto::StartRunResponse>), CoreError> {
    let response = engine.start_run(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn describe_run(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
) -> ApiResult<proto::RunInfo> {
    Ok(Json(engine.describe_run(&run_id).await?))
}

async fn wait_run(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
    Query(query): Query<proto::WaitQuery>,
) -> ApiResult<proto::RunInfo> {
    let wait = Duration::from_millis(query.wait_ms).min(MAX_WAIT);
    Ok(Json(engine.wait_for_terminal(&run_id, wait).await?))
}

async fn history(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
) -> ApiResult<proto::HistoryResponse> {
    Ok(Json(engine.history(&run_id).await?))
}

async fn claim(
    State(engine): State<Arc<Engine>>,
    Path(task_queue): Path<String>,
    Json(request): Json<proto::ClaimRequest>,
) -> ApiResult<proto::ClaimResponse> {
    let run = engine.claim_run(&task_queue, &request.worker_id).await?;
    Ok(Json(proto::ClaimResponse { run }))
}

async fn heartbeat(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
    Json(request): Json<proto::HeartbeatRequest>,
) -> ApiResult<proto::HeartbeatResponse> {
    Ok(Json(engine.heartbeat(&run_id, &request.worker_id).await?))
}

async fn get_step(
    State(engine): State<Arc<Engine>>,
    Path((run_id, step_key)): Path<(String, String)>,
) -> ApiResult<proto::StepLookupResponse> {
    let step = engine.get_step(&run_id, &step_key).await?;
    Ok(Json(proto::StepLookupResponse { step }))
}

async fn record_attempt(
    State(engine): State<Arc<Engine>>,
    Path((run_id, step_key)): Path<(String, String)>,
    Json(request): Json<proto::RecordAttemptRequest>,
) -> Result<StatusCode, CoreError> {
    engine.record_attempt(&run_id, &step_key, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_step(
    State(engine): State<Arc<Engine>>,
    Path((run_id, step_key)): Path<(String, String)>,
    Json(request): Json<proto::SaveStepRequest>,
) -> ApiResult<proto::StepRecord> {
    Ok(Json(engine.save_step(&run_id, &step_key, request).await?))
}

async fn complete_run(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
    Json(request): Json<proto::CompleteRunRequest>,
) -> Result<StatusCode, CoreError> {
    engine.complete_run(&run_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fail_run(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
    Json(request): Json<proto::FailRunRequest>,
) -> Result<StatusCode, CoreError> {
    engine.fail_run(&run_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
