// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activities: named, retry-safe units of work invoked by workflows.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Error returned by one activity attempt.
///
/// Retryable errors are retried under the active retry policy; fatal ones
/// fail the invocation immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActivityError {
    pub message: String,
    pub retryable: bool,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Per-attempt information handed to an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
    pub run_id: String,
    pub activity_name: String,
    /// 1-based attempt number of this invocation.
    pub attempt: u32,
}

/// A registered activity.
///
/// Activities run at least once per logical invocation and must be safe to
/// re-invoke.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn execute(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError>;
}

/// Adapter turning an async closure over JSON values into an [`Activity`].
pub struct FnActivity<F> {
    f: F,
}

impl<F> FnActivity<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(ActivityContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActivityError>> + Send,
{
    async fn execute(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError> {
        (self.f)(ctx, input).await
    }
}

/// Adapter with typed input and output. Undecodable input is fatal.
struct TypedActivity<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, Fut, I, O> Activity for TypedActivity<F, I, O>
where
    F: Fn(ActivityContext, I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ActivityError>> + Send,
    I: DeserializeOwned + Send,
    O: Serialize + Send,
{
    async fn execute(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let input: I = serde_json::from_value(input).map_err(|e| {
            ActivityError::fatal(format!(
                "invalid input for activity '{}': {}",
                ctx.activity_name, e
            ))
        })?;
        let output = (self.f)(ctx, input).await?;
        serde_json::to_value(output)
            .map_err(|e| ActivityError::fatal(format!("unserializable activity output: {}", e)))
    }
}

/// Immutable name -> activity map shared by the worker and every workflow
/// context.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn builder() -> ActivityRegistryBuilder {
        ActivityRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run one attempt of `name`. Unknown names fail without retry.
    pub async fn invoke(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError> {
        match self.get(&ctx.activity_name) {
            Some(activity) => activity.execute(ctx, input).await,
            None => Err(ActivityError::fatal(format!(
                "activity '{}' is not registered",
                ctx.activity_name
            ))),
        }
    }
}

#[derive(Default)]
pub struct ActivityRegistryBuilder {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistryBuilder {
    /// Register an activity under `name`, replacing any earlier one.
    pub fn register(mut self, name: impl Into<String>, activity: impl Activity + 'static) -> Self {
        self.activities.insert(name.into(), Arc::new(activity));
        self
    }

    /// Register a closure with typed input and output.
    pub fn register_typed<F, Fut, I, O>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.register(
            name,
            TypedActivity {
                f,
                _types: PhantomData,
            },
        )
    }

    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            activities: self.activities,
        }
    }
}
