// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise API - HTTP frontend.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /` | `"Hello, World!"` |
//! | `GET /health` | service and substrate health |
//! | `GET /greet?name=` | chat log of one `InteractWithMe` run |
//! | `GET /runs/{run_id}` | run diagnostics |
//! | `GET /counter`, `GET /counter/add` | in-process counter |

pub mod config;
pub mod error;
pub mod handlers;
pub mod responses;
pub mod server;
pub mod state;

pub use config::{ApiConfig, ConfigError};
pub use error::ApiError;
pub use server::router;
pub use state::AppState;
