// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route patterns (for the axum router) and concrete path builders (for
//! HTTP clients). Path segments are percent-encoded by the builders.

use urlencoding::encode;

pub const HEALTH: &str = "/health";
pub const RUNS: &str = "/v1/runs";
pub const RUN: &str = "/v1/runs/{run_id}";
pub const RUN_WAIT: &str = "/v1/runs/{run_id}/wait";
pub const RUN_HISTORY: &str = "/v1/runs/{run_id}/history";
pub const RUN_HEARTBEAT: &str = "/v1/runs/{run_id}/heartbeat";
pub const RUN_STEP: &str = "/v1/runs/{run_id}/steps/{step_key}";
pub const RUN_STEP_ATTEMPTS: &str = "/v1/runs/{run_id}/steps/{step_key}/attempts";
pub const RUN_COMPLETE: &str = "/v1/runs/{run_id}/complete";
pub const RUN_FAIL: &str = "/v1/runs/{run_id}/fail";
pub const QUEUE_CLAIM: &str = "/v1/queues/{task_queue}/claim";

pub fn run(run_id: &str) -> String {
    format!("{RUNS}/{}", encode(run_id))
}

pub fn run_wait(run_id: &str, wait_ms: u64) -> String {
    format!("{}/wait?wait_ms={wait_ms}", run(run_id))
}

pub fn run_history(run_id: &str) -> String {
    format!("{}/history", run(run_id))
}

pub fn run_heartbeat(run_id: &str) -> String {
    format!("{}/heartbeat", run(run_id))
}

pub fn run_step(run_id: &str, step_key: &str) -> String {
    format!("{}/steps/{}", run(run_id), encode(step_key))
}

pub fn run_step_attempts(run_id: &str, step_key: &str) -> String {
    format!("{}/attempts", run_step(run_id, step_key))
}

pub fn run_complete(run_id: &str) -> String {
    format!("{}/complete", run(run_id))
}

pub fn run_fail(run_id: &str) -> String {
    format!("{}/fail", run(run_id))
}

pub fn queue_claim(task_queue: &str) -> String {
    format!("/v1/queues/{}/claim", encode(task_queue))
}
