// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global serialization gate for replica mutations.
//!
//! Every code path that mutates PowerDNS (full sync, webhook- or
//! bus-triggered zone reconciles, manual sync) must hold this gate, keeping
//! at most one mutation in flight against the replica at any instant.
//! Read-only status and health paths never touch it.
//!
//! Acquisition is instrumented: wait time is logged on success (WARN past
//! one second), the hold time is logged when the guard drops, and waits past
//! the timeout fail with [`GateError::Timeout`] so the trigger is dropped
//! rather than piling up.

use crate::errors::GateError;
use crate::metrics;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Default acquisition timeout (30 seconds)
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait duration past which acquisition is logged at WARN (1 second)
const CONTENTION_WARN_THRESHOLD: Duration = Duration::from_secs(1);

/// The single mutex serializing all replica mutations.
#[derive(Debug)]
pub struct OperationGate {
    lock: Mutex<()>,
    acquire_timeout: Duration,
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationGate {
    /// Create a gate with the standard 30s acquisition timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Create a gate with a custom acquisition timeout.
    #[must_use]
    pub fn with_timeout(acquire_timeout: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            acquire_timeout,
        }
    }

    /// Acquire the gate for a named operation.
    ///
    /// Blocks up to the configured timeout. The returned guard releases the
    /// gate on every exit path, logging the total hold time as it drops.
    ///
    /// # Errors
    ///
    /// [`GateError::Timeout`] when another operation holds the gate for the
    /// whole timeout window.
    pub async fn acquire(&self, operation: &str) -> Result<GateGuard<'_>, GateError> {
        debug!(operation, "attempting to acquire sync lock");
        let wait_start = Instant::now();

        let Ok(guard) = tokio::time::timeout(self.acquire_timeout, self.lock.lock()).await else {
            error!(
                operation,
                timeout_secs = self.acquire_timeout.as_secs(),
                "failed to acquire sync lock within timeout"
            );
            return Err(GateError::Timeout {
                operation: operation.to_string(),
                timeout_secs: self.acquire_timeout.as_secs(),
            });
        };

        let waited = wait_start.elapsed();
        metrics::observe_gate_wait(waited);
        if waited > CONTENTION_WARN_THRESHOLD {
            warn!(
                operation,
                waited = %format!("{:.3}s", waited.as_secs_f64()),
                "sync lock acquired after contention"
            );
        } else {
            debug!(
                operation,
                waited = %format!("{:.3}s", waited.as_secs_f64()),
                "sync lock acquired"
            );
        }

        Ok(GateGuard {
            _guard: guard,
            operation: operation.to_string(),
            acquired_at: Instant::now(),
        })
    }
}

/// Scoped holder of the gate; releasing is dropping.
#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    operation: String,
    acquired_at: Instant,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        metrics::observe_gate_hold(held);
        debug!(
            operation = %self.operation,
            held = %format!("{:.3}s", held.as_secs_f64()),
            "sync lock released"
        );
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod gate_tests;
