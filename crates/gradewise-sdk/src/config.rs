// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK configuration for connecting a worker to gradewise-core.

use std::env;
use std::time::Duration;

use crate::error::{Result, SdkError};

/// Default substrate address (service name inside the compose network).
pub const DEFAULT_SUBSTRATE_ADDR: &str = "gradewise-core:7233";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Substrate address, `host:port` or a full `http(s)://` base URL
    /// (default: "gradewise-core:7233")
    pub substrate_addr: String,
    /// Identity reported on claims and writes (default: "worker-{uuid}")
    pub worker_id: String,
    /// Per-request timeout in milliseconds (default: 30_000)
    pub request_timeout_ms: u64,
    /// Pause between empty claims in milliseconds (default: 250)
    pub poll_interval_ms: u64,
    /// Lease heartbeat interval in milliseconds (default: 10_000).
    /// Set to 0 to disable heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Runs executed concurrently (default: 16)
    pub max_concurrent_runs: usize,
}

impl SdkConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `GRADEWISE_SUBSTRATE_ADDR` - Substrate address (default: "gradewise-core:7233")
    /// - `GRADEWISE_WORKER_ID` - Worker identity (default: "worker-{uuid}")
    /// - `GRADEWISE_REQUEST_TIMEOUT_MS` - Request timeout (default: 30000)
    /// - `GRADEWISE_POLL_INTERVAL_MS` - Empty-queue poll interval (default: 250)
    /// - `GRADEWISE_HEARTBEAT_INTERVAL_MS` - Heartbeat interval (default: 10000, 0 to disable)
    /// - `GRADEWISE_MAX_CONCURRENT_RUNS` - Concurrency bound (default: 16)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let substrate_addr = env::var("GRADEWISE_SUBSTRATE_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.substrate_addr);

        let worker_id = env::var("GRADEWISE_WORKER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.worker_id);

        let request_timeout_ms =
            parse_var("GRADEWISE_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?;
        let poll_interval_ms = parse_var("GRADEWISE_POLL_INTERVAL_MS", defaults.poll_interval_ms)?;
        let heartbeat_interval_ms = parse_var(
            "GRADEWISE_HEARTBEAT_INTERVAL_MS",
            defaults.heartbeat_interval_ms,
        )?;
        let max_concurrent_runs = parse_var(
            "GRADEWISE_MAX_CONCURRENT_RUNS",
            defaults.max_concurrent_runs,
        )?;
        if max_concurrent_runs == 0 {
            return Err(SdkError::Config(
                "GRADEWISE_MAX_CONCURRENT_RUNS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            substrate_addr,
            worker_id,
            request_timeout_ms,
            poll_interval_ms,
            heartbeat_interval_ms,
            max_concurrent_runs,
        })
    }

    /// Configuration for a substrate on `127.0.0.1:7233`.
    pub fn localhost() -> Self {
        Self::default().with_substrate_addr("127.0.0.1:7233")
    }

    /// Base URL for HTTP calls.
    pub fn base_url(&self) -> String {
        let addr = self.substrate_addr.trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        }
    }

    pub fn with_substrate_addr(mut self, addr: impl Into<String>) -> Self {
        self.substrate_addr = addr.into();
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` when heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            substrate_addr: DEFAULT_SUBSTRATE_ADDR.to_string(),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            request_timeout_ms: 30_000,
            poll_interval_ms: 250,
            heartbeat_interval_ms: 10_000,
            max_concurrent_runs: 16,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SdkError::Config(format!("invalid {}: '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
