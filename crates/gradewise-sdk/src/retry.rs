// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policy and per-invocation activity options.

use std::time::Duration;

use thiserror::Error;

/// Exponential backoff policy applied to failed activity attempts.
///
/// The wait after failed attempt `n` (1-based) is
/// `min(initial_interval * backoff_coefficient^(n-1), maximum_interval)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub maximum_interval: Duration,
    /// Must be greater than 1.
    pub backoff_coefficient: f64,
    /// Unbounded when `None`.
    pub maximum_attempts: Option<u32>,
}

/// Rejected retry policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryPolicyError {
    #[error("initial_interval must be greater than zero")]
    ZeroInitialInterval,

    #[error("maximum_interval must not be shorter than initial_interval")]
    MaximumBelowInitial,

    #[error("backoff_coefficient must be greater than 1")]
    CoefficientTooSmall,

    #[error("maximum_attempts must be at least 1 when set")]
    ZeroMaximumAttempts,
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, maximum_interval: Duration, backoff_coefficient: f64) -> Self {
        Self {
            initial_interval,
            maximum_interval,
            backoff_coefficient,
            maximum_attempts: None,
        }
    }

    pub fn with_maximum_attempts(mut self, maximum_attempts: u32) -> Self {
        self.maximum_attempts = Some(maximum_attempts);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.maximum_attempts = None;
        self
    }

    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.initial_interval.is_zero() {
            return Err(RetryPolicyError::ZeroInitialInterval);
        }
        if self.maximum_interval < self.initial_interval {
            return Err(RetryPolicyError::MaximumBelowInitial);
        }
        // Written negated so NaN is rejected too.
        if !(self.backoff_coefficient > 1.0) {
            return Err(RetryPolicyError::CoefficientTooSmall);
        }
        if self.maximum_attempts == Some(0) {
            return Err(RetryPolicyError::ZeroMaximumAttempts);
        }
        Ok(())
    }

    /// Backoff to wait after failed attempt `attempt` (1-based).
    pub fn interval(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = secs.min(self.maximum_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.maximum_interval)
    }

    /// Whether no attempt may follow `attempts_made`.
    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        self.maximum_attempts
            .is_some_and(|maximum| attempts_made >= maximum)
    }
}

impl Default for RetryPolicy {
    /// 1s initial, 60s cap, doubling, unbounded attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}

/// Options governing one activity invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub retry_policy: RetryPolicy,
    /// An attempt running longer than this counts as a retryable failure.
    pub start_to_close_timeout: Duration,
}

impl ActivityOptions {
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            start_to_close_timeout: Duration::from_secs(60),
        }
    }
}
