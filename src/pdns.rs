// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client for the PowerDNS Authoritative HTTP API v1 (the replica).
//!
//! All zone reads and mutations go through this client. Every call is a
//! retry-wrapped single-attempt request: transport failures and 5xx
//! responses retry with the shared backoff policy, 4xx responses fail
//! fast. The one exception is zone creation hitting `409 Conflict`, which
//! is demoted to a warning and reported as success so creates stay
//! idempotent.

use crate::errors::ReplicaError;
use crate::metrics;
use crate::model::{RrsetChange, Zone};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

/// Read/create/patch/delete interface to the replica DNS server.
#[async_trait]
pub trait ReplicaApi: Send + Sync {
    /// Fetch a zone with its rrsets; `Ok(None)` when it does not exist.
    async fn get_zone(&self, name: &str) -> Result<Option<Zone>, ReplicaError>;

    /// List all zones (summaries without rrsets).
    async fn list_zones(&self) -> Result<Vec<Zone>, ReplicaError>;

    /// Create a zone. Creation racing an existing zone succeeds.
    async fn create_zone(&self, zone: &Zone) -> Result<(), ReplicaError>;

    /// Apply a sequence of rrset changes to a zone.
    async fn patch_zone(&self, name: &str, changes: &[RrsetChange]) -> Result<(), ReplicaError>;

    /// Delete a zone. Deleting an absent zone succeeds.
    async fn delete_zone(&self, name: &str) -> Result<(), ReplicaError>;
}

/// HTTP client for one PowerDNS server.
#[derive(Debug, Clone)]
pub struct PdnsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    server_id: String,
    retry: RetryPolicy,
}

impl PdnsClient {
    /// Create a client scoped to a server identifier (usually `localhost`).
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            server_id: server_id.into(),
            retry: RetryPolicy::default(),
        }
    }

    fn zones_url(&self) -> String {
        format!("{}/api/v1/servers/{}/zones", self.base_url, self.server_id)
    }

    fn zone_url(&self, name: &str) -> String {
        format!("{}/{name}", self.zones_url())
    }

    fn transport_error(what: &str, e: &reqwest::Error) -> ReplicaError {
        ReplicaError::Unavailable {
            reason: format!("{what}: {e}"),
        }
    }

    /// Map a non-success response to the error taxonomy: 404 not-found,
    /// 409 conflict, 5xx unavailable (retryable), anything else rejected.
    async fn status_error(zone: &str, response: reqwest::Response) -> ReplicaError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match status {
            404 => ReplicaError::NotFound {
                zone: zone.to_string(),
            },
            409 => ReplicaError::Conflict {
                zone: zone.to_string(),
            },
            500..=599 => ReplicaError::Unavailable {
                reason: format!("HTTP {status}: {body}"),
            },
            _ => ReplicaError::Rejected {
                status,
                reason: body,
            },
        }
    }

    async fn get_zone_once(&self, url: &str, zone: &str) -> Result<Option<Zone>, ReplicaError> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport_error(zone, &e))?;

        if response.status().is_success() {
            let parsed = response.json().await.map_err(|e| ReplicaError::Unavailable {
                reason: format!("zone {zone}: invalid JSON response: {e}"),
            })?;
            Ok(Some(parsed))
        } else if response.status().as_u16() == 404 {
            Ok(None)
        } else {
            Err(Self::status_error(zone, response).await)
        }
    }

    async fn list_zones_once(&self, url: &str) -> Result<Vec<Zone>, ReplicaError> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport_error("list zones", &e))?;

        if response.status().is_success() {
            response.json().await.map_err(|e| ReplicaError::Unavailable {
                reason: format!("list zones: invalid JSON response: {e}"),
            })
        } else {
            Err(Self::status_error("*", response).await)
        }
    }

    async fn create_zone_once(&self, url: &str, zone: &Zone) -> Result<(), ReplicaError> {
        let response = self
            .http
            .post(url)
            .header("X-API-Key", &self.api_key)
            .json(zone)
            .send()
            .await
            .map_err(|e| Self::transport_error(&zone.name, &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(&zone.name, response).await)
        }
    }

    async fn patch_zone_once(
        &self,
        url: &str,
        zone: &str,
        body: &serde_json::Value,
    ) -> Result<(), ReplicaError> {
        let response = self
            .http
            .patch(url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(zone, &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(zone, response).await)
        }
    }

    async fn delete_zone_once(&self, url: &str, zone: &str) -> Result<(), ReplicaError> {
        let response = self
            .http
            .delete(url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport_error(zone, &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(zone, response).await)
        }
    }
}

#[async_trait]
impl ReplicaApi for PdnsClient {
    async fn get_zone(&self, name: &str) -> Result<Option<Zone>, ReplicaError> {
        let what = format!("get zone {name}");
        let url = self.zone_url(name);
        let url = url.as_str();

        retry_with_backoff(&self.retry, &what, || self.get_zone_once(url, name)).await
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, ReplicaError> {
        let url = self.zones_url();
        let url = url.as_str();

        retry_with_backoff(&self.retry, "list zones", || self.list_zones_once(url)).await
    }

    async fn create_zone(&self, zone: &Zone) -> Result<(), ReplicaError> {
        let what = format!("create zone {}", zone.name);
        let url = self.zones_url();
        let url = url.as_str();

        let result =
            retry_with_backoff(&self.retry, &what, || self.create_zone_once(url, zone)).await;

        match result {
            Ok(()) => {
                metrics::record_zone_mutation("create");
                info!(zone = %zone.name, "created zone in PowerDNS");
                Ok(())
            }
            Err(ReplicaError::Conflict { zone }) => {
                warn!(zone = %zone, "zone already exists in PowerDNS, skipping creation");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn patch_zone(&self, name: &str, changes: &[RrsetChange]) -> Result<(), ReplicaError> {
        let what = format!("patch zone {name}");
        let url = self.zone_url(name);
        let url = url.as_str();
        let body = json!({ "rrsets": changes });
        let body = &body;

        retry_with_backoff(&self.retry, &what, || self.patch_zone_once(url, name, body)).await?;

        metrics::record_zone_mutation("patch");
        info!(zone = name, changes = changes.len(), "patched zone in PowerDNS");
        Ok(())
    }

    async fn delete_zone(&self, name: &str) -> Result<(), ReplicaError> {
        let what = format!("delete zone {name}");
        let url = self.zone_url(name);
        let url = url.as_str();

        let result =
            retry_with_backoff(&self.retry, &what, || self.delete_zone_once(url, name)).await;

        match result {
            Ok(()) => {
                metrics::record_zone_mutation("delete");
                info!(zone = name, "deleted zone from PowerDNS");
                Ok(())
            }
            Err(ReplicaError::NotFound { zone }) => {
                debug!(zone = %zone, "zone already absent from PowerDNS");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "pdns_tests.rs"]
mod pdns_tests;
