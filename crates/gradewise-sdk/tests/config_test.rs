// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration tests for gradewise-sdk.

use std::env;
use std::sync::Mutex;
use std::time::Duration;

use gradewise_sdk::{DEFAULT_SUBSTRATE_ADDR, SdkConfig, SdkError};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "GRADEWISE_SUBSTRATE_ADDR",
    "GRADEWISE_WORKER_ID",
    "GRADEWISE_REQUEST_TIMEOUT_MS",
    "GRADEWISE_POLL_INTERVAL_MS",
    "GRADEWISE_HEARTBEAT_INTERVAL_MS",
    "GRADEWISE_MAX_CONCURRENT_RUNS",
];

struct EnvGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn cleared() -> Self {
        let mut guard = Self { vars: Vec::new() };
        for key in VARS {
            guard.remove(key);
        }
        guard
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

#[test]
fn test_from_env_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _guard = EnvGuard::cleared();

    let config = SdkConfig::from_env().unwrap();

    assert_eq!(config.substrate_addr, DEFAULT_SUBSTRATE_ADDR);
    assert!(config.worker_id.starts_with("worker-"));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(10)));
    assert_eq!(config.max_concurrent_runs, 16);
    assert_eq!(config.base_url(), "http://gradewise-core:7233");
}

#[test]
fn test_from_env_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut guard = EnvGuard::cleared();
    guard.set("GRADEWISE_SUBSTRATE_ADDR", "https://substrate.internal/");
    guard.set("GRADEWISE_WORKER_ID", "worker-a");
    guard.set("GRADEWISE_REQUEST_TIMEOUT_MS", "1500");
    guard.set("GRADEWISE_POLL_INTERVAL_MS", "20");
    guard.set("GRADEWISE_HEARTBEAT_INTERVAL_MS", "0");
    guard.set("GRADEWISE_MAX_CONCURRENT_RUNS", "4");

    let config = SdkConfig::from_env().unwrap();

    assert_eq!(config.worker_id, "worker-a");
    assert_eq!(config.base_url(), "https://substrate.internal");
    assert_eq!(config.request_timeout(), Duration::from_millis(1500));
    assert_eq!(config.poll_interval(), Duration::from_millis(20));
    assert_eq!(config.heartbeat_interval(), None);
    assert_eq!(config.max_concurrent_runs, 4);
}

#[test]
fn test_from_env_rejects_invalid_values() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut guard = EnvGuard::cleared();

    guard.set("GRADEWISE_POLL_INTERVAL_MS", "soon");
    assert!(matches!(SdkConfig::from_env(), Err(SdkError::Config(_))));

    guard.set("GRADEWISE_POLL_INTERVAL_MS", "10");
    guard.set("GRADEWISE_MAX_CONCURRENT_RUNS", "0");
    assert!(matches!(SdkConfig::from_env(), Err(SdkError::Config(_))));
}

#[test]
fn test_builders() {
    let config = SdkConfig::localhost()
        .with_worker_id("w-9")
        .with_max_concurrent_runs(0)
        .with_heartbeat_interval_ms(500);

    assert_eq!(config.base_url(), "http://127.0.0.1:7233");
    assert_eq!(config.worker_id, "w-9");
    assert_eq!(config.max_concurrent_runs, 1);
    assert_eq!(config.heartbeat_interval(), Some(Duration::from_millis(500)));
}
