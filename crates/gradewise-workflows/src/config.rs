// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker process configuration.

use std::env;

use gradewise_sdk::{SdkConfig, SdkError};
use thiserror::Error;

use crate::activities::DEFAULT_LOCAL_GREETING;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Sdk(#[from] SdkError),
}

/// Configuration of the `gradewise-worker` process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Substrate connection and worker loop settings.
    pub sdk: SdkConfig,
    /// Greeting used by the `Greet` activity (default: "Hello").
    pub local_greeting: String,
}

impl WorkerConfig {
    /// Load from environment variables: the `GRADEWISE_*` worker variables of
    /// [`SdkConfig::from_env`] plus `GRADEWISE_LOCAL_GREETING`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let sdk = SdkConfig::from_env()?;
        let local_greeting = env::var("GRADEWISE_LOCAL_GREETING")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCAL_GREETING.to_string());

        Ok(Self {
            sdk,
            local_greeting,
        })
    }

    pub fn with_local_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.local_greeting = greeting.into();
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sdk: SdkConfig::default(),
            local_greeting: DEFAULT_LOCAL_GREETING.to_string(),
        }
    }
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
    fn test_local_greeting_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("GRADEWISE_LOCAL_GREETING", "おはよ");
        assert_eq!(WorkerConfig::from_env().unwrap().local_greeting, "おはよ");

        guard.set("GRADEWISE_LOCAL_GREETING", "  ");
        assert_eq!(WorkerConfig::from_env().unwrap().local_greeting, "Hello");
    }
}
