// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process-wide application state for status reporting.
//!
//! One writer per field: the background initial-sync task owns the
//! `initial_sync_*` fields, the scheduler loop owns `scheduler_running`,
//! and the MQTT event loop owns `mqtt_connected`. Readers (the status
//! endpoints) take no lock and may observe a slightly stale snapshot, which
//! is fine for reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Uptime past which an incomplete initial sync degrades health to Warning
/// (5 minutes)
const INITIAL_SYNC_WARN_AFTER_SECS: f64 = 300.0;

/// Overall service health as reported by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Operating normally
    Healthy,
    /// Initial sync still pending well past startup
    Warning,
    /// Initial sync failed
    Degraded,
}

impl Health {
    /// The wire string used in status JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Warning => "Warning",
            Self::Degraded => "Degraded",
        }
    }
}

/// Classify health from the raw inputs. Pure so the thresholds are directly
/// testable.
#[must_use]
pub fn classify_health(uptime_seconds: f64, initial_sync_completed: bool, has_error: bool) -> Health {
    if has_error {
        Health::Degraded
    } else if !initial_sync_completed && uptime_seconds > INITIAL_SYNC_WARN_AFTER_SECS {
        Health::Warning
    } else {
        Health::Healthy
    }
}

/// Shared mutable state of the running process.
#[derive(Debug)]
pub struct AppState {
    started_at: Instant,
    initial_sync_started: AtomicBool,
    initial_sync_completed: AtomicBool,
    initial_sync_error: Mutex<Option<String>>,
    scheduler_running: AtomicBool,
    mqtt_connected: AtomicBool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Fresh state stamped with the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            initial_sync_started: AtomicBool::new(false),
            initial_sync_completed: AtomicBool::new(false),
            initial_sync_error: Mutex::new(None),
            scheduler_running: AtomicBool::new(false),
            mqtt_connected: AtomicBool::new(false),
        }
    }

    /// Seconds since process start.
    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Mark the background initial sync as launched.
    pub fn mark_initial_sync_started(&self) {
        self.initial_sync_started.store(true, Ordering::Release);
    }

    /// Mark the initial sync as finished successfully, clearing any error.
    pub fn mark_initial_sync_completed(&self) {
        self.initial_sync_completed.store(true, Ordering::Release);
        *self.initial_sync_error.lock().expect("state lock poisoned") = None;
    }

    /// Record an initial-sync failure.
    pub fn record_initial_sync_error(&self, error: impl Into<String>) {
        *self.initial_sync_error.lock().expect("state lock poisoned") = Some(error.into());
    }

    #[must_use]
    pub fn initial_sync_started(&self) -> bool {
        self.initial_sync_started.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn initial_sync_completed(&self) -> bool {
        self.initial_sync_completed.load(Ordering::Acquire)
    }

    /// The recorded initial-sync error, if any.
    #[must_use]
    pub fn initial_sync_error(&self) -> Option<String> {
        self.initial_sync_error
            .lock()
            .expect("state lock poisoned")
            .clone()
    }

    pub fn set_scheduler_running(&self, running: bool) {
        self.scheduler_running.store(running, Ordering::Release);
    }

    #[must_use]
    pub fn scheduler_running(&self) -> bool {
        self.scheduler_running.load(Ordering::Acquire)
    }

    pub fn set_mqtt_connected(&self, connected: bool) {
        self.mqtt_connected.store(connected, Ordering::Release);
    }

    #[must_use]
    pub fn mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Acquire)
    }

    /// Current health classification.
    #[must_use]
    pub fn health(&self) -> Health {
        classify_health(
            self.uptime_seconds(),
            self.initial_sync_completed(),
            self.initial_sync_error().is_some(),
        )
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
