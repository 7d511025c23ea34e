// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow definitions and their registry.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::context::WorkflowContext;
use crate::error::SdkError;

/// An activity invocation that failed permanently: retries exhausted or a
/// non-retryable error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("activity '{activity_name}' failed after {attempts} attempt(s): {message}")]
pub struct ActivityFailure {
    pub activity_name: String,
    pub attempts: u32,
    /// Error of the last attempt.
    pub message: String,
}

/// Ways a workflow run can end without a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Activity(#[from] ActivityFailure),

    /// Failure raised by workflow logic.
    #[error("{0}")]
    Application(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The substrate rejected a call.
    #[error("substrate error: {0}")]
    Substrate(String),

    /// The substrate stayed unreachable through every retry of a call.
    #[error("substrate unavailable: {0}")]
    Unavailable(String),

    /// The worker lost its lease; the run must be abandoned.
    #[error("lease lost: {0}")]
    LeaseLost(String),
}

impl WorkflowError {
    /// Prefix a workflow-level failure with `context`. Infrastructure errors
    /// pass through unchanged so the worker can still tell them apart.
    pub fn wrap(self, context: &str) -> Self {
        match self {
            WorkflowError::Activity(_) | WorkflowError::Application(_) => {
                WorkflowError::Application(format!("{}: {}", context, self))
            }
            other => other,
        }
    }
}

impl From<SdkError> for WorkflowError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::LeaseLost(message) => WorkflowError::LeaseLost(message),
            SdkError::Serialization(message) => WorkflowError::Serialization(message),
            other if other.is_transient() => WorkflowError::Unavailable(other.to_string()),
            other => WorkflowError::Substrate(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// A deterministic composition of activity invocations.
///
/// Given the same recorded step outcomes a workflow must issue the same
/// invocations in the same order; that is what makes replay after a worker
/// crash possible.
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError>;
}

/// Adapter turning an async closure over JSON values into a [`Workflow`].
pub struct FnWorkflow<F> {
    f: F,
}

impl<F> FnWorkflow<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Workflow for FnWorkflow<F>
where
    F: Fn(WorkflowContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, WorkflowError>> + Send,
{
    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        (self.f)(ctx, input).await
    }
}

struct TypedWorkflow<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, Fut, I, O> Workflow for TypedWorkflow<F, I, O>
where
    F: Fn(WorkflowContext, I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, WorkflowError>> + Send,
    I: DeserializeOwned + Send,
    O: Serialize + Send,
{
    async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        let input: I = serde_json::from_value(input)?;
        let output = (self.f)(ctx, input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Immutable workflow type -> definition map.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder::default()
    }

    pub fn get(&self, workflow_type: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(workflow_type).cloned()
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.workflows.contains_key(workflow_type)
    }
}

#[derive(Default)]
pub struct WorkflowRegistryBuilder {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistryBuilder {
    pub fn register(
        mut self,
        workflow_type: impl Into<String>,
        workflow: impl Workflow + 'static,
    ) -> Self {
        self.workflows.insert(workflow_type.into(), Arc::new(workflow));
        self
    }

    /// Register a closure with typed input and output.
    pub fn register_typed<F, Fut, I, O>(self, workflow_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(WorkflowContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, WorkflowError>> + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.register(
            workflow_type,
            TypedWorkflow {
                f,
                _types: PhantomData,
            },
        )
    }

    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            workflows: self.workflows,
        }
    }
}
