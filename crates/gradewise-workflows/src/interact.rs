// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The `InteractWithMe` workflow: greet, then say goodbye.

use std::time::Duration;

use gradewise_sdk::{ActivityOptions, RetryPolicy, WorkflowContext, WorkflowError};

use crate::activities::{GREET, SAY_GOODBYE};

pub const WORKFLOW_TYPE: &str = "InteractWithMe";

/// Options shared by every activity of the workflow: one minute per attempt,
/// backoff from 1s doubling up to 1m, no attempt limit.
pub fn activity_options() -> ActivityOptions {
    ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(60))
        .with_retry_policy(RetryPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
        ))
}

/// Returns the chat log, one activity output per line.
pub async fn interact_with_me(ctx: WorkflowContext, name: String) -> Result<String, WorkflowError> {
    let options = activity_options();
    let mut chat_log = Vec::with_capacity(2);

    let greeting: String = ctx
        .execute_activity_with(GREET, &name, &options)
        .await
        .map_err(|e| e.wrap("failed to greet"))?;
    chat_log.push(greeting);

    let goodbye: String = ctx
        .execute_activity_with(SAY_GOODBYE, &(), &options)
        .await
        .map_err(|e| e.wrap("failed to say goodbye"))?;
    chat_log.push(goodbye);

    Ok(chat_log.join("\n"))
}
