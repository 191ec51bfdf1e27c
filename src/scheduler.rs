// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cron-driven periodic full synchronization.
//!
//! A single background task sleeps until the next fire time of the
//! configured 5-field crontab expression and runs a full sync. A tick that
//! cannot acquire the sync lock within the standard timeout is skipped with
//! a warning; the schedule itself keeps running.

use crate::context::AppContext;
use crate::errors::SyncError;
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Parse a 5-field crontab expression into a [`Schedule`].
///
/// The `cron` crate expects a seconds field, so the expression is anchored
/// to second zero before parsing.
///
/// # Errors
///
/// Returns the parser error for expressions that are not valid crontab
/// syntax. Field-count validation happens in [`crate::config`] first.
pub fn parse_crontab(expr: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&format!("0 {}", expr.trim()))
}

/// Spawn the scheduler loop.
///
/// The task marks `scheduler_running` in the application state for the
/// lifetime of the loop and fires `full_sync` with trigger `schedule` at
/// every cron match.
pub fn spawn(schedule: Schedule, ctx: Arc<AppContext>) -> JoinHandle<()> {
    ctx.state.set_scheduler_running(true);

    tokio::spawn(async move {
        info!(crontab = %ctx.config.sync_crontab, "periodic sync schedule started");

        loop {
            let now = Utc::now();
            let Some(next) = schedule.after(&now).next() else {
                warn!("crontab has no future fire times, stopping scheduler");
                break;
            };

            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next_run = %next, "sleeping until next scheduled full sync");
            tokio::time::sleep(wait).await;

            match ctx.engine.sync_all("schedule").await {
                Ok(report) => {
                    info!(
                        zones = report.zones,
                        created = report.created,
                        updated = report.updated,
                        deleted = report.deleted,
                        pruned = report.pruned,
                        failed = report.failed.len(),
                        "scheduled full sync finished"
                    );
                }
                Err(SyncError::Gate(e)) => {
                    warn!(error = %e, "scheduled full sync skipped, previous operation still holds the lock");
                }
                Err(e) => {
                    error!(error = %e, "scheduled full sync failed");
                }
            }
        }

        ctx.state.set_scheduler_running(false);
    })
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
