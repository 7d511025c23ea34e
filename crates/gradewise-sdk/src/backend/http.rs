// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP-based SDK backend for gradewise-core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_protocol::{
    ClaimRequest, ClaimResponse, ClaimedRun, CompleteRunRequest, ErrorBody, FailRunRequest,
    HealthResponse, HeartbeatRequest, HeartbeatResponse, RecordAttemptRequest, SaveStepRequest,
    StepLookupResponse, StepRecord, paths,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::SdkBackend;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

/// HTTP backend for worker operations.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(config: &SdkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        check(request.send().await?).await?;
        Ok(())
    }
}

/// Turn non-2xx responses into [`SdkError`]s using the JSON error body.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "Substrate returned an error");
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => Err(SdkError::from_server(error.code, error.message)),
        Err(_) => Err(SdkError::UnexpectedResponse(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        ))),
    }
}

#[async_trait]
impl SdkBackend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse> {
        self.send_json(self.client.get(self.url(paths::HEALTH))).await
    }

    #[instrument(skip(self))]
    async fn claim(&self, task_queue: &str, worker_id: &str) -> Result<Option<ClaimedRun>> {
        let request = self
            .client
            .post(self.url(&paths::queue_claim(task_queue)))
            .json(&ClaimRequest {
                worker_id: worker_id.to_string(),
            });
        let response: ClaimResponse = self.send_json(request).await?;
        Ok(response.run)
    }

    #[instrument(skip(self))]
    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<DateTime<Utc>> {
        let request = self
            .client
            .post(self.url(&paths::run_heartbeat(run_id)))
            .json(&HeartbeatRequest {
                worker_id: worker_id.to_string(),
            });
        let response: HeartbeatResponse = self.send_json(request).await?;
        Ok(response.lease_expires_at)
    }

    async fn get_step(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>> {
        let request = self.client.get(self.url(&paths::run_step(run_id, step_key)));
        let response: StepLookupResponse = self.send_json(request).await?;
        Ok(response.step)
    }

    async fn record_attempt(
        &self,
        run_id: &str,
        step_key: &str,
        request: RecordAttemptRequest,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url(&paths::run_step_attempts(run_id, step_key)))
            .json(&request);
        self.send_empty(request).await
    }

    async fn save_step(
        &self,
        run_id: &str,
        step_key: &str,
        request: SaveStepRequest,
    ) -> Result<StepRecord> {
        let request = self
            .client
            .put(self.url(&paths::run_step(run_id, step_key)))
            .json(&request);
        self.send_json(request).await
    }

    #[instrument(skip(self, output))]
    async fn complete(&self, run_id: &str, worker_id: &str, output: Value) -> Result<()> {
        let request = self
            .client
            .post(self.url(&paths::run_complete(run_id)))
            .json(&CompleteRunRequest {
                worker_id: worker_id.to_string(),
                output,
            });
        self.send_empty(request).await
    }

    #[instrument(skip(self))]
    async fn fail(&self, run_id: &str, worker_id: &str, error: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&paths::run_fail(run_id)))
            .json(&FailRunRequest {
                worker_id: worker_id.to_string(),
                error: error.to_string(),
            });
        self.send_empty(request).await
    }
}
