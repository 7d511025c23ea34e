// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handler state.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use gradewise_client::OrchestrationClient;

/// State handed to every handler. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub client: OrchestrationClient,
    /// Bound on waiting for a run's result within one request.
    pub await_timeout: Duration,
    counter: Arc<AtomicI64>,
}

impl AppState {
    pub fn new(client: OrchestrationClient, await_timeout: Duration) -> Self {
        Self {
            client,
            await_timeout,
            counter: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn counter(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Returns the incremented value.
    pub fn increment_counter(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}
