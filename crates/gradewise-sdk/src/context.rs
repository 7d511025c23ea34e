// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow execution context: sequenced, replayable activity invocation.
//!
//! Each call to [`WorkflowContext::execute_activity`] gets the next sequence
//! number and the step key `"{sequence}:{activity_name}"`. Before running
//! anything the context looks the step up in the substrate:
//!
//! - settled `completed`: the recorded output is returned, nothing runs;
//! - settled `failed`: the recorded failure is returned, nothing runs;
//! - unsettled: attempts continue from the recorded attempt count, after the
//!   backoff owed to the last failed attempt. A step whose recorded failures
//!   already exhaust the retry policy is settled as failed without running.
//!
//! Every attempt is recorded before the next one starts, and the final
//! outcome is settled with the substrate, whose answer is authoritative.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use gradewise_protocol::{RecordAttemptRequest, SaveStepRequest, StepOutcome, StepRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::activity::{ActivityContext, ActivityError, ActivityRegistry};
use crate::backend::{SdkBackend, retry_transient};
use crate::retry::ActivityOptions;
use crate::workflow::{ActivityFailure, WorkflowError};

/// Step key of the `sequence`-th invocation (1-based) of `activity_name`.
pub fn step_key(sequence: u32, activity_name: &str) -> String {
    format!("{}:{}", sequence, activity_name)
}

struct Inner {
    run_id: String,
    worker_id: String,
    backend: Arc<dyn SdkBackend>,
    activities: Arc<ActivityRegistry>,
    options: ActivityOptions,
    sequence: AtomicU32,
}

/// Handle a workflow uses to invoke activities. Cheap to clone; clones share
/// the sequence counter.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<Inner>,
}

impl WorkflowContext {
    pub fn new(
        run_id: impl Into<String>,
        worker_id: impl Into<String>,
        backend: Arc<dyn SdkBackend>,
        activities: Arc<ActivityRegistry>,
        options: ActivityOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                run_id: run_id.into(),
                worker_id: worker_id.into(),
                backend,
                activities,
                options,
                sequence: AtomicU32::new(0),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Options applied when none are passed explicitly.
    pub fn activity_options(&self) -> &ActivityOptions {
        &self.inner.options
    }

    /// Number of invocations issued so far.
    pub fn sequence(&self) -> u32 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// Invoke `activity_name` with the run's default options.
    pub async fn execute_activity<I, O>(&self, activity_name: &str, input: &I) -> Result<O, WorkflowError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let options = self.inner.options.clone();
        self.execute_activity_with(activity_name, input, &options).await
    }

    /// Invoke `activity_name` with per-invocation options.
    pub async fn execute_activity_with<I, O>(
        &self,
        activity_name: &str,
        input: &I,
        options: &ActivityOptions,
    ) -> Result<O, WorkflowError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let output = self.invoke(activity_name, input, options).await?;
        Ok(serde_json::from_value(output)?)
    }

    async fn invoke(
        &self,
        activity_name: &str,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, WorkflowError> {
        let inner = &self.inner;
        let sequence = inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let key = step_key(sequence, activity_name);

        let mut attempt = 0;
        let recorded = retry_transient("get_step", &inner.run_id, || {
            inner.backend.get_step(&inner.run_id, &key)
        })
        .await?;
        if let Some(step) = recorded {
            if step.is_settled() {
                debug!(run_id = %inner.run_id, step_key = %key, "Replaying recorded step");
                return settled_result(step);
            }
            attempt = step.attempts;
            info!(run_id = %inner.run_id, step_key = %key, attempts = attempt, "Resuming step");

            // A recorded success whose output was never saved is simply re-run.
            if let Some(error) = step.last_error {
                if options.retry_policy.is_exhausted(attempt) {
                    warn!(
                        run_id = %inner.run_id,
                        step_key = %key,
                        attempt,
                        error = %error,
                        "Recorded attempts exhausted the retry policy"
                    );
                    let step = self
                        .save(&key, activity_name, attempt, StepOutcome::Failed { error })
                        .await?;
                    return settled_result(step);
                }
                tokio::time::sleep(options.retry_policy.interval(attempt)).await;
            }
        }

        loop {
            attempt += 1;
            let ctx = ActivityContext {
                run_id: inner.run_id.clone(),
                activity_name: activity_name.to_string(),
                attempt,
            };

            let result = match tokio::time::timeout(
                options.start_to_close_timeout,
                inner.activities.invoke(ctx, input.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ActivityError::retryable(format!(
                    "attempt timed out after {:?}",
                    options.start_to_close_timeout
                ))),
            };

            match result {
                Ok(output) => {
                    self.record_attempt(&key, activity_name, attempt, None).await?;
                    let step = self
                        .save(&key, activity_name, attempt, StepOutcome::Completed { output })
                        .await?;
                    return settled_result(step);
                }
                Err(err) => {
                    self.record_attempt(&key, activity_name, attempt, Some(err.message.clone()))
                        .await?;

                    if !err.retryable || options.retry_policy.is_exhausted(attempt) {
                        warn!(
                            run_id = %inner.run_id,
                            step_key = %key,
                            attempt,
                            retryable = err.retryable,
                            error = %err.message,
                            "Activity failed permanently"
                        );
                        let step = self
                            .save(
                                &key,
                                activity_name,
                                attempt,
                                StepOutcome::Failed { error: err.message },
                            )
                            .await?;
                        return settled_result(step);
                    }

                    let backoff = options.retry_policy.interval(attempt);
                    warn!(
                        run_id = %inner.run_id,
                        step_key = %key,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err.message,
                        "Activity attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn record_attempt(
        &self,
        step_key: &str,
        activity_name: &str,
        attempt: u32,
        error: Option<String>,
    ) -> Result<(), WorkflowError> {
        let inner = &self.inner;
        retry_transient("record_attempt", &inner.run_id, || {
            inner.backend.record_attempt(
                &inner.run_id,
                step_key,
                RecordAttemptRequest {
                    worker_id: inner.worker_id.clone(),
                    activity_name: activity_name.to_string(),
                    attempt,
                    error: error.clone(),
                },
            )
        })
        .await?;
        Ok(())
    }

    async fn save(
        &self,
        step_key: &str,
        activity_name: &str,
        attempts: u32,
        outcome: StepOutcome,
    ) -> Result<StepRecord, WorkflowError> {
        let inner = &self.inner;
        let step = retry_transient("save_step", &inner.run_id, || {
            inner.backend.save_step(
                &inner.run_id,
                step_key,
                SaveStepRequest {
                    worker_id: inner.worker_id.clone(),
                    activity_name: activity_name.to_string(),
                    attempts,
                    outcome: outcome.clone(),
                },
            )
        })
        .await?;
        Ok(step)
    }
}

fn settled_result(step: StepRecord) -> Result<Value, WorkflowError> {
    match step.outcome {
        Some(StepOutcome::Completed { output }) => Ok(output),
        Some(StepOutcome::Failed { error }) => Err(WorkflowError::Activity(ActivityFailure {
            activity_name: step.activity_name,
            attempts: step.attempts,
            message: error,
        })),
        None => Err(WorkflowError::Substrate(format!(
            "step '{}' is not settled",
            step.step_key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_key_format() {
        assert_eq!(step_key(1, "Greet"), "1:Greet");
        assert_eq!(step_key(12, "SayGoodbye"), "12:SayGoodbye");
    }

    #[test]
    fn test_settled_failure_carries_attempts() {
        let err = settled_result(StepRecord {
            step_key: "1:Greet".to_string(),
            activity_name: "Greet".to_string(),
            attempts: 4,
            outcome: Some(StepOutcome::Failed {
                error: "boom".to_string(),
            }),
            last_error: None,
        })
        .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Activity(ActivityFailure {
                activity_name: "Greet".to_string(),
                attempts: 4,
                message: "boom".to_string(),
            })
        );
    }
}
