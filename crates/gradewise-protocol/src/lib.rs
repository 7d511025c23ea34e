// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise Protocol - HTTP + JSON communication layer
//!
//! This crate provides the wire protocol spoken between:
//! - Workers and gradewise-core (claim, heartbeat, step store, completion)
//! - Orchestration clients and gradewise-core (start, describe, wait, history)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    gradewise-protocol                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Routes: `paths` (axum patterns + URL builders)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: `types` (serde JSON request/response bodies)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: HTTP/1.1 (axum server, reqwest clients)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors travel as [`ErrorBody`] with a stable machine-readable `code`
//! (see [`error_codes`]) and a human-readable message.

pub mod paths;
pub mod types;

pub use types::*;

/// Stable error codes carried in [`ErrorBody::code`].
pub mod error_codes {
    pub const RUN_NOT_FOUND: &str = "RUN_NOT_FOUND";
    pub const RUN_ALREADY_STARTED: &str = "RUN_ALREADY_STARTED";
    pub const LEASE_LOST: &str = "LEASE_LOST";
    pub const INVALID_RUN_STATE: &str = "INVALID_RUN_STATE";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
}
