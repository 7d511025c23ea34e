// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Default listen address of the substrate.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7233";

/// Gradewise Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// SQLite connection URL; in-memory persistence when unset
    pub database_url: Option<String>,
    /// How long a claim stays valid without a heartbeat
    pub lease_duration_ms: u64,
    /// Interval of the lease / deadline sweeper
    pub sweep_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `GRADEWISE_CORE_BIND_ADDR`: listen address (default: 0.0.0.0:7233)
    /// - `GRADEWISE_DATABASE_URL`: SQLite URL (default: in-memory)
    /// - `GRADEWISE_LEASE_DURATION_MS`: lease duration (default: 30000)
    /// - `GRADEWISE_SWEEP_INTERVAL_MS`: sweeper interval (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = std::env::var("GRADEWISE_CORE_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GRADEWISE_CORE_BIND_ADDR", "must be a socket address")
            })?;

        let database_url = std::env::var("GRADEWISE_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let lease_duration_ms = positive_ms("GRADEWISE_LEASE_DURATION_MS", 30_000)?;
        let sweep_interval_ms = positive_ms("GRADEWISE_SWEEP_INTERVAL_MS", 1_000)?;

        Ok(Self {
            bind_addr,
            database_url,
            lease_duration_ms,
            sweep_interval_ms,
        })
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn positive_ms(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value: u64 = match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a positive integer"))?,
        Err(_) => default,
    };
    if value == 0 {
        return Err(ConfigError::Invalid(key, "must be a positive integer"));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
