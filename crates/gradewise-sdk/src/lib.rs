// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise SDK - worker side of the durable workflow orchestration core.
//!
//! This crate provides everything a worker process needs to execute workflow
//! runs handed out by gradewise-core:
//!
//! - **Activities**: named, retry-safe units of work ([`Activity`],
//!   [`ActivityRegistry`])
//! - **Retry policies**: exponential backoff with optional attempt limit
//!   ([`RetryPolicy`], [`ActivityOptions`])
//! - **Workflows**: deterministic compositions of activities ([`Workflow`],
//!   [`WorkflowRegistry`]) driven through a replaying [`WorkflowContext`]
//! - **Worker**: task-queue polling, leases and heartbeats ([`Worker`])
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use gradewise_sdk::{ActivityRegistry, HttpBackend, SdkConfig, Worker, WorkflowRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SdkConfig::from_env()?;
//! let backend = Arc::new(HttpBackend::new(&config)?);
//!
//! let activities = ActivityRegistry::builder()
//!     .register_typed("Greet", |_ctx, name: String| async move {
//!         Ok::<_, ActivityError>(format!("Hello, {}!", name))
//!     })
//!     .build();
//!
//! let workflows = WorkflowRegistry::builder()
//!     .register_typed("Hello", |ctx: WorkflowContext, name: String| async move {
//!         ctx.execute_activity::<_, String>("Greet", &name).await
//!     })
//!     .build();
//!
//! let worker = Worker::new(backend, &config, "my-queue", Arc::new(workflows), Arc::new(activities));
//! worker.check_connection().await?;
//! worker.run(CancellationToken::new()).await?;
//! ```
//!
//! # Backends
//!
//! | Backend | Feature | Use |
//! |---------|---------|-----|
//! | [`HttpBackend`] | `http` (default) | Worker talking to a remote gradewise-core |
//! | [`EmbeddedBackend`] | always | Worker and engine in one process, tests |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GRADEWISE_SUBSTRATE_ADDR` | `gradewise-core:7233` | Substrate address |
//! | `GRADEWISE_WORKER_ID` | `worker-{uuid}` | Worker identity |
//! | `GRADEWISE_REQUEST_TIMEOUT_MS` | `30000` | Request timeout |
//! | `GRADEWISE_POLL_INTERVAL_MS` | `250` | Empty-queue poll interval |
//! | `GRADEWISE_HEARTBEAT_INTERVAL_MS` | `10000` | Lease heartbeat, 0 disables |
//! | `GRADEWISE_MAX_CONCURRENT_RUNS` | `16` | Concurrency bound |

pub mod activity;
pub mod backend;
mod config;
pub mod context;
mod error;
pub mod retry;
pub mod worker;
pub mod workflow;

pub use activity::{
    Activity, ActivityContext, ActivityError, ActivityRegistry, ActivityRegistryBuilder,
    FnActivity,
};
#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{EmbeddedBackend, SdkBackend};
pub use config::{DEFAULT_SUBSTRATE_ADDR, SdkConfig};
pub use context::{WorkflowContext, step_key};
pub use error::{Result, SdkError};
pub use retry::{ActivityOptions, RetryPolicy, RetryPolicyError};
pub use worker::Worker;
pub use workflow::{
    ActivityFailure, FnWorkflow, Workflow, WorkflowError, WorkflowRegistry,
    WorkflowRegistryBuilder,
};
