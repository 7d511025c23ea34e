// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise workflows: the greeting activities and the `InteractWithMe`
//! workflow served on the `gradewise-backend` task queue.

pub mod activities;
pub mod config;
pub mod interact;

use std::sync::Arc;

use gradewise_sdk::{ActivityRegistry, SdkBackend, Worker, WorkflowRegistry};

pub use activities::GreetingActivities;
pub use config::{ConfigError, WorkerConfig};
pub use interact::{WORKFLOW_TYPE, interact_with_me};

/// Task queue shared by the frontend and the worker.
pub const TASK_QUEUE: &str = "gradewise-backend";

pub fn activity_registry(activities: GreetingActivities) -> ActivityRegistry {
    activities.register(ActivityRegistry::builder()).build()
}

pub fn workflow_registry() -> WorkflowRegistry {
    WorkflowRegistry::builder()
        .register_typed(WORKFLOW_TYPE, interact_with_me)
        .build()
}

/// Worker serving [`TASK_QUEUE`] with every workflow and activity of this
/// crate.
pub fn build_worker(backend: Arc<dyn SdkBackend>, config: &WorkerConfig) -> Worker {
    Worker::new(
        backend,
        &config.sdk,
        TASK_QUEUE,
        Arc::new(workflow_registry()),
        Arc::new(activity_registry(GreetingActivities::new(
            config.local_greeting.clone(),
        ))),
    )
    .with_activity_options(interact::activity_options())
}
