// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client backend for gradewise-core.

use std::time::Duration;

use async_trait::async_trait;
use gradewise_protocol::{
    ErrorBody, HealthResponse, HistoryResponse, RunInfo, StartRunRequest, StartRunResponse, paths,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ClientBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            request_timeout: config.request_timeout,
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
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "Substrate returned an error");
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => Err(ClientError::Server {
            code: error.code,
            message: error.message,
        }),
        Err(_) => Err(ClientError::Server {
            code: status.as_u16().to_string(),
            message: body,
        }),
    }
}

#[async_trait]
impl ClientBackend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse> {
        let request = self
            .client
            .get(self.url(paths::HEALTH))
            .timeout(self.request_timeout);
        self.send_json(request).await
    }

    async fn start_run(&self, request: StartRunRequest) -> Result<String> {
        let request = self
            .client
            .post(self.url(paths::RUNS))
            .timeout(self.request_timeout)
            .json(&request);
        let response: StartRunResponse = self.send_json(request).await?;
        Ok(response.run_id)
    }

    async fn describe_run(&self, run_id: &str) -> Result<RunInfo> {
        let request = self
            .client
            .get(self.url(&paths::run(run_id)))
            .timeout(self.request_timeout);
        self.send_json(request).await
    }

    async fn wait_run(&self, run_id: &str, wait: Duration) -> Result<RunInfo> {
        // The server holds the request for up to `wait`.
        let request = self
            .client
            .get(self.url(&paths::run_wait(run_id, wait.as_millis() as u64)))
            .timeout(wait + self.request_timeout);
        self.send_json(request).await
    }

    async fn history(&self, run_id: &str) -> Result<HistoryResponse> {
        let request = self
            .client
            .get(self.url(&paths::run_history(run_id)))
            .timeout(self.request_timeout);
        self.send_json(request).await
    }
}
