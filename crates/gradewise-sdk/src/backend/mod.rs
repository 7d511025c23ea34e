// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK backend implementations.
//!
//! This module provides different backends for worker operations:
//! - `http`: HTTP/JSON communication with a gradewise-core service (default)
//! - `embedded`: direct engine calls for in-process deployments and tests

pub mod embedded;
#[cfg(feature = "http")]
pub mod http;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gradewise_protocol::{
    ClaimedRun, HealthResponse, RecordAttemptRequest, SaveStepRequest, StepRecord,
};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

pub use embedded::EmbeddedBackend;
#[cfg(feature = "http")]
pub use http::HttpBackend;

/// Backend trait for worker operations.
///
/// Abstracts the communication layer so the worker and workflow context run
/// unchanged against a remote substrate or an in-process engine. Ownership
/// violations surface as [`SdkError::LeaseLost`](crate::SdkError::LeaseLost).
#[async_trait]
pub trait SdkBackend: Send + Sync {
    /// Probe the substrate.
    async fn health(&self) -> Result<HealthResponse>;

    /// Lease the next queued run on `task_queue`, if any.
    async fn claim(&self, task_queue: &str, worker_id: &str) -> Result<Option<ClaimedRun>>;

    /// Extend the lease; returns the new expiry.
    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<DateTime<Utc>>;

    /// Recorded step, settled or not.
    async fn get_step(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>>;

    async fn record_attempt(
        &self,
        run_id: &str,
        step_key: &str,
        request: RecordAttemptRequest,
    ) -> Result<()>;

    /// Settle a step; returns the authoritative record (first write wins).
    async fn save_step(
        &self,
        run_id: &str,
        step_key: &str,
        request: SaveStepRequest,
    ) -> Result<StepRecord>;

    async fn complete(&self, run_id: &str, worker_id: &str, output: Value) -> Result<()>;

    async fn fail(&self, run_id: &str, worker_id: &str, error: &str) -> Result<()>;
}

/// Tries made at a substrate call before its error is returned.
pub(crate) const SUBSTRATE_TRIES: u32 = 3;

/// Backoff after the first failed try; doubles on each further try.
pub(crate) const SUBSTRATE_BACKOFF: Duration = Duration::from_millis(100);

/// Run `call`, repeating it with backoff while it fails transiently.
pub(crate) async fn retry_transient<T, F, Fut>(operation: &str, run_id: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 1;
    let mut backoff = SUBSTRATE_BACKOFF;
    loop {
        match call().await {
            Err(e) if e.is_transient() && tries < SUBSTRATE_TRIES => {
                warn!(
                    run_id = %run_id,
                    operation,
                    tries,
                    error = %e,
                    "Substrate call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                tries += 1;
                backoff *= 2;
            }
            result => return result,
        }
    }
}
