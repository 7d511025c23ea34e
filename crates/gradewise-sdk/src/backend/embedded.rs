// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded SDK backend for direct engine access.
//!
//! This backend bypasses HTTP and calls the gradewise-core engine directly,
//! suitable for running the substrate within the same process.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_core::Engine;
use gradewise_protocol::{
    ClaimedRun, CompleteRunRequest, FailRunRequest, HealthResponse, RecordAttemptRequest,
    SaveStepRequest, StepRecord,
};
use serde_json::Value;
use tracing::instrument;

use super::SdkBackend;
use crate::error::Result;

/// Embedded backend for worker operations.
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
impl SdkBackend for EmbeddedBackend {
    async fn health(&self) -> Result<HealthResponse> {
        Ok(self.engine.health().await?)
    }

    #[instrument(skip(self))]
    async fn claim(&self, task_queue: &str, worker_id: &str) -> Result<Option<ClaimedRun>> {
        Ok(self.engine.claim_run(task_queue, worker_id).await?)
    }

    #[instrument(skip(self))]
    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<DateTime<Utc>> {
        Ok(self.engine.heartbeat(run_id, worker_id).await?.lease_expires_at)
    }

    async fn get_step(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>> {
        Ok(self.engine.get_step(run_id, step_key).await?)
    }

    async fn record_attempt(
        &self,
        run_id: &str,
        step_key: &str,
        request: RecordAttemptRequest,
    ) -> Result<()> {
        Ok(self.engine.record_attempt(run_id, step_key, request).await?)
    }

    async fn save_step(
        &self,
        run_id: &str,
        step_key: &str,
        request: SaveStepRequest,
    ) -> Result<StepRecord> {
        Ok(self.engine.save_step(run_id, step_key, request).await?)
    }

    #[instrument(skip(self, output))]
    async fn complete(&self, run_id: &str, worker_id: &str, output: Value) -> Result<()> {
        let request = CompleteRunRequest {
            worker_id: worker_id.to_string(),
            output,
        };
        Ok(self.engine.complete_run(run_id, request).await?)
    }

    #[instrument(skip(self))]
    async fn fail(&self, run_id: &str, worker_id: &str, error: &str) -> Result<()> {
        let request = FailRunRequest {
            worker_id: worker_id.to_string(),
            error: error.to_string(),
        };
        Ok(self.engine.fail_run(run_id, request).await?)
    }
}
