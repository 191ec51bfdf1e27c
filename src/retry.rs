// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for outbound API calls.
//!
//! This module provides the single retry helper wrapped around every NetBox
//! and PowerDNS call. Transient failures (transport errors, HTTP 5xx) are
//! retried with jittered exponential backoff; permanent failures (4xx other
//! than create-conflict) fail fast.

use crate::errors::Retryable;
use rand::Rng;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Maximum number of attempts per logical call
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry (1 second)
const DEFAULT_BASE_DELAY_SECS: f64 = 1.0;

/// Upper bound on any single delay (60 seconds)
const DEFAULT_MAX_DELAY_SECS: f64 = 60.0;

/// Exponential growth factor between retries
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Retry parameters carried by the API clients.
///
/// The delay before attempt `n` (n >= 2) is
/// `base_delay * backoff_factor^(n-1)`, capped at `max_delay`, then scaled
/// by `uniform(0.5, 1.0)` when jitter is enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay used for the exponential schedule
    pub base_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    /// Exponential growth factor (typically 2.0)
    pub backoff_factor: f64,
    /// Scale each delay by a uniform factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs_f64(DEFAULT_BASE_DELAY_SECS),
            max_delay: Duration::from_secs_f64(DEFAULT_MAX_DELAY_SECS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay to sleep before attempt `attempt` (1-based; the
    /// first attempt never sleeps).
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped
        };

        Duration::from_secs_f64(scaled)
    }
}

/// Execute an async operation with exponential-backoff retry.
///
/// Retries only errors whose [`Retryable::is_retryable`] returns true; any
/// other error is surfaced immediately. Every failed attempt is logged at
/// WARN with the attempt number and computed delay; exhausting the policy
/// logs at ERROR and returns the last error.
///
/// # Arguments
///
/// * `policy` - Retry parameters (attempt count, delays, jitter)
/// * `operation_name` - Human-readable name for logging (e.g., "patch zone example.com.")
/// * `operation` - Async closure performing the call
///
/// # Errors
///
/// Returns the last error when the error is non-retryable or the attempt
/// budget is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                error!(
                    operation = operation_name,
                    error = %e,
                    "non-retryable error, failing immediately"
                );
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                error!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "call failed, attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_before_attempt(attempt + 1);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    retry_in = ?delay,
                    error = %e,
                    "retryable error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
