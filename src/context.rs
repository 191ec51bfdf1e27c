// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context wiring the engine together.
//!
//! [`SyncEngine`] pairs the reconciler with the global operation gate: it is
//! the only place the gate is acquired, so every mutating entry point
//! (scheduler tick, webhook, bus event, manual sync, startup sync) goes
//! through it and replica mutations stay serialized. [`AppContext`] is the
//! state handed to the HTTP layer and the background tasks.

use crate::api::RateLimiter;
use crate::config::Config;
use crate::errors::SyncError;
use crate::gate::OperationGate;
use crate::metrics;
use crate::reconciler::{SyncReport, ZoneOutcome, ZoneReconciler};
use crate::state::AppState;
use std::sync::Arc;

/// Gated entry points for all synchronization work.
pub struct SyncEngine {
    gate: OperationGate,
    reconciler: ZoneReconciler,
}

impl SyncEngine {
    /// Engine with the standard 30s gate timeout.
    #[must_use]
    pub fn new(reconciler: ZoneReconciler) -> Self {
        Self::with_gate(OperationGate::new(), reconciler)
    }

    /// Engine with a caller-supplied gate (tests use short timeouts).
    #[must_use]
    pub fn with_gate(gate: OperationGate, reconciler: ZoneReconciler) -> Self {
        Self { gate, reconciler }
    }

    /// Run a full synchronization under the gate.
    ///
    /// The gate is held for the entire run so zone-level triggers cannot
    /// interleave with it.
    ///
    /// # Errors
    ///
    /// [`SyncError::Gate`] when the gate is busy past its timeout, otherwise
    /// whatever the orchestrator surfaces.
    pub async fn sync_all(&self, trigger: &str) -> Result<SyncReport, SyncError> {
        let _guard = self.gate.acquire("full_sync").await?;
        let result = self.reconciler.full_sync(trigger).await;
        metrics::record_sync(trigger, if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Reconcile a single zone under the gate.
    ///
    /// `trigger` labels metrics (`webhook`, `message_bus`, ...); `operation`
    /// labels the gate acquisition so contention logs identify the holder.
    ///
    /// # Errors
    ///
    /// Same contract as [`SyncEngine::sync_all`].
    pub async fn sync_zone(
        &self,
        trigger: &str,
        operation: &str,
        zone_name: &str,
    ) -> Result<ZoneOutcome, SyncError> {
        let _guard = self.gate.acquire(operation).await?;
        let result = self.reconciler.reconcile(zone_name).await;
        metrics::record_sync(trigger, if result.is_ok() { "success" } else { "error" });
        result
    }
}

/// Everything the HTTP handlers and background tasks share.
pub struct AppContext {
    /// Validated configuration
    pub config: Arc<Config>,
    /// Process-wide status state
    pub state: Arc<AppState>,
    /// Gated synchronization entry points
    pub engine: SyncEngine,
    /// Per-IP request rate limiter
    pub rate_limiter: RateLimiter,
}

impl AppContext {
    /// Assemble the shared context.
    #[must_use]
    pub fn new(config: Arc<Config>, state: Arc<AppState>, engine: SyncEngine) -> Self {
        Self {
            config,
            state,
            engine,
            rate_limiter: RateLimiter::new(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
