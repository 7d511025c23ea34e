// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise Client - start workflow runs and await their results.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use gradewise_client::{OrchestrationClient, StartRunOptions};
//!
//! let client = OrchestrationClient::from_env()?;
//! client.connect().await?;
//!
//! let run_id = client
//!     .start_run("InteractWithMe", "Sam", StartRunOptions::new("gradewise-backend"))
//!     .await?;
//! let chat: String = client
//!     .await_result_typed(&run_id, Duration::from_secs(30))
//!     .await?;
//! ```
//!
//! `await_result` long-polls the substrate in slices of at most
//! `GRADEWISE_LONG_POLL_MS` until the run is terminal or the caller's timeout
//! passes. A timeout never cancels the run.

pub mod backend;
mod client;
mod config;
mod error;

pub use backend::ClientBackend;
pub use client::{OrchestrationClient, StartRunOptions};
pub use config::{ClientConfig, DEFAULT_SUBSTRATE_ADDR};
pub use error::{ClientError, Result};
