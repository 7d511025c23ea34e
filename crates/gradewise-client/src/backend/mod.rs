// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client backend implementations.
//!
//! - `http`: HTTP/JSON communication with a gradewise-core service (default)
//! - `embedded`: direct engine calls for in-process deployments and tests

pub mod embedded;
#[cfg(feature = "http")]
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use gradewise_protocol::{HealthResponse, HistoryResponse, RunInfo, StartRunRequest};

use crate::error::Result;

pub use embedded::EmbeddedBackend;
#[cfg(feature = "http")]
pub use http::HttpBackend;

/// Backend trait for client operations.
#[async_trait]
pub trait ClientBackend: Send + Sync {
    async fn health(&self) -> Result<HealthResponse>;

    /// Enqueue a run; returns its id.
    async fn start_run(&self, request: StartRunRequest) -> Result<String>;

    async fn describe_run(&self, run_id: &str) -> Result<RunInfo>;

    /// Describe the run once terminal, or after `wait` at the latest.
    async fn wait_run(&self, run_id: &str, wait: Duration) -> Result<RunInfo>;

    async fn history(&self, run_id: &str) -> Result<HistoryResponse>;
}
