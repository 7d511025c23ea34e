// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use gradewise_client::{ClientConfig, ClientError};

pub const DEFAULT_PORT: u16 = 8080;

/// Default bound on how long `/greet` waits for its run.
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gradewise API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP listen port (all interfaces)
    pub port: u16,
    /// Upper bound on waiting for a run's result within one request
    pub await_timeout: Duration,
    /// Orchestration client settings
    pub client: ClientConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            await_timeout: DEFAULT_AWAIT_TIMEOUT,
            client: ClientConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `PORT`: listen port (default: 8080)
    /// - `GRADEWISE_AWAIT_TIMEOUT_MS`: result wait per request (default: 30000)
    /// - the `GRADEWISE_*` client variables of [`ClientConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", "must be a port number"))?,
            _ => DEFAULT_PORT,
        };

        let await_timeout_ms: u64 = match env::var("GRADEWISE_AWAIT_TIMEOUT_MS") {
            Ok(raw) => raw.parse().map_err(|_| {
                ConfigError::Invalid("GRADEWISE_AWAIT_TIMEOUT_MS", "must be a positive integer")
            })?,
            Err(_) => DEFAULT_AWAIT_TIMEOUT.as_millis() as u64,
        };
        if await_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "GRADEWISE_AWAIT_TIMEOUT_MS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            port,
            await_timeout: Duration::from_millis(await_timeout_ms),
            client: ClientConfig::from_env()?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("PORT");
        guard.remove("GRADEWISE_AWAIT_TIMEOUT_MS");
        guard.remove("GRADEWISE_SUBSTRATE_ADDR");

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.await_timeout, Duration::from_secs(30));
        assert_eq!(config.client.substrate_addr, "gradewise-core:7233");
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("PORT", "9090");
        guard.set("GRADEWISE_AWAIT_TIMEOUT_MS", "1500");
        guard.set("GRADEWISE_SUBSTRATE_ADDR", "localhost:7233");

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.await_timeout, Duration::from_millis(1500));
        assert_eq!(config.client.substrate_addr, "localhost:7233");
    }

    #[test]
    fn test_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PORT", "eighty");
        assert!(matches!(
            ApiConfig::from_env(),
            Err(ConfigError::Invalid("PORT", _))
        ));

        guard.set("PORT", "8080");
        guard.set("GRADEWISE_AWAIT_TIMEOUT_MS", "0");
        assert!(matches!(
            ApiConfig::from_env(),
            Err(ConfigError::Invalid("GRADEWISE_AWAIT_TIMEOUT_MS", _))
        ));
    }
}
