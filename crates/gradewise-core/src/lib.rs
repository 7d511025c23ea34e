// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise Core - Durable Execution Substrate
//!
//! Core is responsible for:
//! - Runs (start, describe, long-poll until terminal)
//! - Task queues (atomic claim under a time-bounded lease)
//! - Step history (attempt log and settled outcomes used for replay)
//! - Lease expiry and execution deadlines (background sweeper)
//!
//! Workers and orchestration clients reach it over HTTP/JSON (`server`
//! feature) or, in the same process, through [`engine::Engine`] directly.

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod persistence;
#[cfg(feature = "server")]
pub mod server;
pub mod sweeper;

pub use engine::{Engine, SweepReport};
pub use error::{CoreError, Result};
