// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the orchestration client.

use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default substrate address (service name inside the compose network).
pub const DEFAULT_SUBSTRATE_ADDR: &str = "gradewise-core:7233";

/// Configuration for the OrchestrationClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Substrate address, `host:port` or a full `http(s)://` base URL.
    pub substrate_addr: String,
    /// Request timeout, not counting the server-side wait of a long poll.
    pub request_timeout: Duration,
    /// Longest single wait request while awaiting a result.
    pub long_poll: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            substrate_addr: DEFAULT_SUBSTRATE_ADDR.to_string(),
            request_timeout: Duration::from_secs(30),
            long_poll: Duration::from_secs(20),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a substrate on `127.0.0.1:7233`.
    pub fn localhost() -> Self {
        Self::default().with_substrate_addr("127.0.0.1:7233")
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GRADEWISE_SUBSTRATE_ADDR`: Substrate address (default: "gradewise-core:7233")
    /// - `GRADEWISE_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `GRADEWISE_LONG_POLL_MS`: Longest single wait request in milliseconds (default: 20000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let substrate_addr = env::var("GRADEWISE_SUBSTRATE_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.substrate_addr);

        let request_timeout_ms = millis_var(
            "GRADEWISE_REQUEST_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
        )?;
        let long_poll_ms = millis_var("GRADEWISE_LONG_POLL_MS", defaults.long_poll.as_millis() as u64)?;

        Ok(Self {
            substrate_addr,
            request_timeout: Duration::from_millis(request_timeout_ms),
            long_poll: Duration::from_millis(long_poll_ms),
        })
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

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_long_poll(mut self, long_poll: Duration) -> Self {
        self.long_poll = long_poll;
        self
    }
}

fn millis_var(key: &str, default: u64) -> Result<u64> {
    let value = match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("invalid {}: {}", key, e)))?,
        Err(_) => default,
    };
    if value == 0 {
        return Err(ClientError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(value)
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
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
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

    fn clear_all(guard: &mut EnvGuard) {
        guard.remove("GRADEWISE_SUBSTRATE_ADDR");
        guard.remove("GRADEWISE_REQUEST_TIMEOUT_MS");
        guard.remove("GRADEWISE_LONG_POLL_MS");
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let config = ClientConfig::from_env().unwrap();

        assert_eq!(config.base_url(), "http://gradewise-core:7233");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.long_poll, Duration::from_secs(20));
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("GRADEWISE_SUBSTRATE_ADDR", "localhost:9000");
        guard.set("GRADEWISE_LONG_POLL_MS", "500");

        let config = ClientConfig::from_env().unwrap();

        assert_eq!(config.base_url(), "http://localhost:9000");
        assert_eq!(config.long_poll, Duration::from_millis(500));
    }

    #[test]
    fn test_config_rejects_zero_and_garbage() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        guard.set("GRADEWISE_LONG_POLL_MS", "0");
        assert!(matches!(ClientConfig::from_env(), Err(ClientError::Config(_))));

        guard.set("GRADEWISE_LONG_POLL_MS", "later");
        assert!(matches!(ClientConfig::from_env(), Err(ClientError::Config(_))));
    }
}
