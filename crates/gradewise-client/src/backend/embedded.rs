// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded client backend calling the gradewise-core engine directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gradewise_core::Engine;
use gradewise_protocol::{HealthResponse, HistoryResponse, RunInfo, StartRunRequest};

use super::ClientBackend;
use crate::error::Result;

#[derive(Clone)]
pub struct EmbeddedBackend {
    engine: Arc<Engine>,
}

impl EmbeddedBackend {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[async_trait]
impl ClientBackend for EmbeddedBackend {
    async fn health(&self) -> Result<HealthResponse> {
        Ok(self.engine.health().await?)
    }

    async fn start_run(&self, request: StartRunRequest) -> Result<String> {
        Ok(self.engine.start_run(request).await?.run_id)
    }

    async fn describe_run(&self, run_id: &str) -> Result<RunInfo> {
        Ok(self.engine.describe_run(run_id).await?)
    }

    async fn wait_run(&self, run_id: &str, wait: Duration) -> Result<RunInfo> {
        Ok(self.engine.wait_for_terminal(run_id, wait).await?)
    }

    async fn history(&self, run_id: &str) -> Result<HistoryResponse> {
        Ok(self.engine.history(run_id).await?)
    }
}
