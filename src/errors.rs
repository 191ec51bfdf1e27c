// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the NetBox to PowerDNS synchronization engine.
//!
//! This module provides specialized error types for:
//! - NetBox DNS plugin API operations (the source of truth)
//! - PowerDNS Authoritative API operations (the replica)
//! - Sync lock acquisition timeouts
//! - Configuration loading and validation
//!
//! Each failure domain gets its own enum so callers can match on the exact
//! condition; `SyncError` unifies them at the reconciler boundary.

use thiserror::Error;

/// Errors returned by the NetBox source client.
///
/// NetBox is read-only from this engine's perspective, so every failure here
/// is a failure to observe the desired state, never to change it.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// NetBox could not be reached or answered with a server error.
    ///
    /// Transport failures, timeouts, and 5xx responses all land here. These
    /// are transient and retried at the client layer.
    #[error("NetBox API unavailable: {reason}")]
    Unavailable {
        /// Description of the transport or server failure
        reason: String,
    },

    /// NetBox rejected the configured API token (HTTP 401 or 403).
    #[error("NetBox rejected credentials (HTTP {status})")]
    Auth {
        /// The HTTP status code returned (401 or 403)
        status: u16,
    },

    /// The requested zone does not exist in NetBox.
    ///
    /// Non-fatal for the reconciler, which treats it as "zone deleted" and
    /// walks the replica-delete path.
    #[error("zone not found in NetBox: {zone}")]
    NotFound {
        /// The zone name or id that was looked up
        zone: String,
    },
}

/// Errors returned by the PowerDNS replica client.
#[derive(Error, Debug, Clone)]
pub enum ReplicaError {
    /// PowerDNS could not be reached or answered with a server error.
    ///
    /// Retried with exponential backoff at the client layer.
    #[error("PowerDNS API unavailable: {reason}")]
    Unavailable {
        /// Description of the transport or server failure
        reason: String,
    },

    /// The requested zone does not exist on the replica (HTTP 404).
    #[error("zone not found in PowerDNS: {zone}")]
    NotFound {
        /// The zone name that was looked up
        zone: String,
    },

    /// Zone creation hit an existing zone (HTTP 409).
    ///
    /// Demoted to a warning by the client: an idempotent create that finds
    /// the zone already present is a success.
    #[error("zone already exists in PowerDNS: {zone}")]
    Conflict {
        /// The zone name that already exists
        zone: String,
    },

    /// PowerDNS rejected the request with a client error other than 409.
    ///
    /// Never retried; the request itself is wrong and repeating it cannot
    /// succeed.
    #[error("PowerDNS rejected request (HTTP {status}): {reason}")]
    Rejected {
        /// The HTTP status code returned
        status: u16,
        /// Response body or error message
        reason: String,
    },
}

/// Failure to acquire the global sync lock within the timeout.
#[derive(Error, Debug, Clone)]
pub enum GateError {
    /// The lock was held by another operation for the whole timeout window.
    #[error("timed out acquiring sync lock for {operation} after {timeout_secs}s")]
    Timeout {
        /// Name of the operation that gave up waiting
        operation: String,
        /// The acquisition timeout in seconds
        timeout_secs: u64,
    },
}

/// Configuration loading and validation errors. Fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Full variable name including the `NETBOX_PDNS_` prefix
        name: String,
    },

    /// A variable is set but its value failed validation.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Full variable name including the `NETBOX_PDNS_` prefix
        name: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Composite error covering every way a reconcile attempt can fail.
///
/// This is the error type surfaced by [`crate::reconciler::ZoneReconciler`]
/// and the gated entry points on [`crate::context::SyncEngine`].
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Source-side failure
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Replica-side failure
    #[error(transparent)]
    Replica(#[from] ReplicaError),

    /// Sync lock acquisition timeout
    #[error(transparent)]
    Gate(#[from] GateError),
}

impl SyncError {
    /// Returns true if this error is transient and the triggering operation
    /// may reasonably be retried later (by the next scheduler tick or event).
    ///
    /// Client-layer retry has already been exhausted by the time a transient
    /// error reaches this level.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => e.is_retryable(),
            Self::Replica(e) => e.is_retryable(),
            Self::Gate(GateError::Timeout { .. }) => true,
        }
    }
}

/// Classification of errors into retryable and terminal, used by
/// [`crate::retry::retry_with_backoff`].
pub trait Retryable {
    /// Returns true if the failed call may succeed when repeated.
    fn is_retryable(&self) -> bool;
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl Retryable for ReplicaError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
