// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only client for the NetBox DNS plugin API (the source of truth).
//!
//! The client performs no caching: every reconciliation works on a fresh
//! snapshot. Paginated list responses are fully consumed before returning.
//! Transient failures retry with the shared backoff policy; credential
//! rejections and missing zones surface as typed errors.

use crate::errors::SourceError;
use crate::model::{ensure_trailing_dot, qualify, Record, RecordSet};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Page size requested from NetBox list endpoints
const PAGE_SIZE: u32 = 100;

/// TTL applied when neither the record nor the zone specifies one (1 hour)
const FALLBACK_RECORD_TTL: u32 = 3600;

/// A nameserver object as referenced by zones.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NameserverRef {
    /// NetBox object id
    pub id: u64,
    /// Nameserver FQDN, no trailing dot
    pub name: String,
}

/// A zone as returned by the NetBox DNS plugin.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceZone {
    /// NetBox object id
    pub id: u64,
    /// Zone name, no trailing dot
    pub name: String,
    /// SOA serial maintained by the plugin
    #[serde(default)]
    pub soa_serial: Option<u32>,
    /// Zone default TTL, used when a record carries none
    #[serde(default)]
    pub default_ttl: Option<u32>,
    /// Authoritative nameservers, in plugin order
    #[serde(default)]
    pub nameservers: Vec<NameserverRef>,
}

impl SourceZone {
    /// Whether the given nameserver object serves this zone, i.e. whether
    /// the zone is in this engine's sync scope.
    #[must_use]
    pub fn is_served_by(&self, nameserver_id: u64) -> bool {
        self.nameservers.iter().any(|ns| ns.id == nameserver_id)
    }
}

/// A single record as returned by the NetBox DNS plugin.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    /// Fully qualified name computed by the plugin, when available
    #[serde(default)]
    pub fqdn: Option<String>,
    /// Short record name relative to the zone (`www`, `@`)
    pub name: String,
    /// RR type string
    #[serde(rename = "type")]
    pub rtype: String,
    /// Record value in presentation format
    pub value: String,
    /// Record TTL; falls back to the zone default
    #[serde(default)]
    pub ttl: Option<u32>,
}

/// One page of a paginated NetBox list response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// Group source records into replica-shaped rrsets.
///
/// Records are keyed by `(fqdn, TYPE)` with names qualified against the zone
/// apex and trailing-dot normalized, types uppercased, and values trimmed.
/// The rrset TTL comes from the first record of the group, then the zone
/// default, then a 1h fallback. Output is sorted by key for deterministic
/// diffs and logs.
#[must_use]
pub fn build_rrsets(zone: &SourceZone, records: &[SourceRecord]) -> Vec<RecordSet> {
    let mut grouped: BTreeMap<(String, String), RecordSet> = BTreeMap::new();

    for record in records {
        let name = record
            .fqdn
            .as_deref()
            .filter(|f| !f.is_empty())
            .map_or_else(|| qualify(&record.name, &zone.name), ensure_trailing_dot);
        let rtype = record.rtype.to_uppercase();
        let ttl = record
            .ttl
            .or(zone.default_ttl)
            .unwrap_or(FALLBACK_RECORD_TTL);

        grouped
            .entry((name.clone(), rtype.clone()))
            .or_insert_with(|| RecordSet {
                name,
                rtype,
                ttl,
                records: Vec::new(),
                comments: Vec::new(),
            })
            .records
            .push(Record::new(record.value.trim()));
    }

    grouped.into_values().collect()
}

/// Read-only query interface to the source inventory.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Fetch a nameserver object by id (used for the ownership FQDN).
    async fn get_nameserver(&self, id: u64) -> Result<NameserverRef, SourceError>;

    /// List every zone served by the given nameserver object.
    async fn list_owned_zones(&self, nameserver_id: u64) -> Result<Vec<SourceZone>, SourceError>;

    /// Fetch a zone by id.
    async fn get_zone(&self, zone_id: u64) -> Result<SourceZone, SourceError>;

    /// Fetch a zone by name; `Ok(None)` when it does not exist.
    async fn get_zone_by_name(&self, name: &str) -> Result<Option<SourceZone>, SourceError>;

    /// Fetch the full record set of a zone.
    async fn get_zone_records(&self, zone_id: u64) -> Result<Vec<SourceRecord>, SourceError>;
}

/// HTTP client for the NetBox DNS plugin.
#[derive(Debug, Clone)]
pub struct NetboxClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl NetboxClient {
    /// Create a client against the given NetBox base URL.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Perform a single authenticated GET, mapping failure modes to
    /// [`SourceError`]. `what` names the object for error context.
    async fn fetch_once<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, SourceError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Unavailable {
                reason: format!("{what}: {e}"),
            })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => response.json().await.map_err(|e| SourceError::Unavailable {
                reason: format!("{what}: invalid JSON response: {e}"),
            }),
            401 | 403 => Err(SourceError::Auth {
                status: status.as_u16(),
            }),
            404 => Err(SourceError::NotFound {
                zone: what.to_string(),
            }),
            _ => Err(SourceError::Unavailable {
                reason: format!("{what}: HTTP {status}"),
            }),
        }
    }

    /// GET with retry.
    async fn fetch<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, SourceError> {
        retry_with_backoff(&self.retry, what, || self.fetch_once(url, what)).await
    }

    /// Consume every page of a paginated list endpoint.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        first_url: String,
        what: &str,
    ) -> Result<Vec<T>, SourceError> {
        let mut results = Vec::new();
        let mut url = first_url;

        loop {
            let page: Page<T> = self.fetch(&url, what).await?;
            results.extend(page.results);
            match page.next {
                Some(next) => url = next,
                None => return Ok(results),
            }
        }
    }
}

#[async_trait]
impl SourceApi for NetboxClient {
    async fn get_nameserver(&self, id: u64) -> Result<NameserverRef, SourceError> {
        let url = format!("{}/api/plugins/netbox-dns/nameservers/{id}/", self.base_url);
        self.fetch(&url, &format!("nameserver {id}")).await
    }

    async fn list_owned_zones(&self, nameserver_id: u64) -> Result<Vec<SourceZone>, SourceError> {
        let url = format!(
            "{}/api/plugins/netbox-dns/zones/?nameserver_id={nameserver_id}&limit={PAGE_SIZE}",
            self.base_url
        );
        self.fetch_all(url, "owned zones").await
    }

    async fn get_zone(&self, zone_id: u64) -> Result<SourceZone, SourceError> {
        let url = format!("{}/api/plugins/netbox-dns/zones/{zone_id}/", self.base_url);
        self.fetch(&url, &format!("zone {zone_id}")).await
    }

    async fn get_zone_by_name(&self, name: &str) -> Result<Option<SourceZone>, SourceError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let url = format!(
            "{}/api/plugins/netbox-dns/zones/?name={trimmed}&limit={PAGE_SIZE}",
            self.base_url
        );
        let zones: Vec<SourceZone> = self.fetch_all(url, &format!("zone {trimmed}")).await?;
        Ok(zones.into_iter().next())
    }

    async fn get_zone_records(&self, zone_id: u64) -> Result<Vec<SourceRecord>, SourceError> {
        let url = format!(
            "{}/api/plugins/netbox-dns/records/?zone_id={zone_id}&limit={PAGE_SIZE}",
            self.base_url
        );
        self.fetch_all(url, &format!("records of zone {zone_id}")).await
    }
}

#[cfg(test)]
#[path = "netbox_tests.rs"]
mod netbox_tests;
