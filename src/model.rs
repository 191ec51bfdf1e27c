// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone and record-set data model shared by the source and replica clients.
//!
//! The types here mirror the PowerDNS Authoritative API v1 wire format, with
//! serde derives doing the (de)serialization. The module also owns the name
//! normalization rules that bridge the two peers:
//!
//! - NetBox zone names never carry a trailing dot; PowerDNS names always do.
//! - Record names on the replica are fully qualified with a trailing dot;
//!   short names from the source are qualified against the zone apex.
//! - RR type strings are uppercase.
//! - Record values within an rrset compare as an unordered multiset; the
//!   nameserver list of a zone stays ordered (PowerDNS derives the SOA
//!   MNAME from it).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// RR types the engine is allowed to create, replace, or delete on the
/// replica. Anything outside this set is left untouched by the diff.
pub const DEFAULT_MANAGED_TYPES: &[&str] = &[
    "A", "AAAA", "CNAME", "MX", "TXT", "SRV", "NS", "PTR", "CAA", "SOA",
];

/// Zone kind as understood by PowerDNS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZoneKind {
    /// Natively replicated zone (backend-level replication)
    #[default]
    Native,
    /// Primary zone (outbound AXFR)
    #[serde(alias = "Master")]
    Primary,
    /// Secondary zone (inbound AXFR)
    #[serde(alias = "Slave")]
    Secondary,
}

/// A single record value within an rrset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record content in PowerDNS presentation format
    pub content: String,
    /// Disabled records are stored but not served
    #[serde(default)]
    pub disabled: bool,
}

impl Record {
    /// Create an enabled record from content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            disabled: false,
        }
    }
}

/// The set of records sharing one `(name, type)` within a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Fully qualified record name with trailing dot
    pub name: String,
    /// Uppercase RR type string (`A`, `AAAA`, ...)
    #[serde(rename = "type")]
    pub rtype: String,
    /// Time to live in seconds
    #[serde(default)]
    pub ttl: u32,
    /// Record values; unordered for comparison purposes
    #[serde(default)]
    pub records: Vec<Record>,
    /// Comments are preserved on the replica but never authored here
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<serde_json::Value>,
}

impl RecordSet {
    /// The rrset identity within its zone.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.name.clone(), self.rtype.clone())
    }

    /// Compare record payloads as unordered multisets of
    /// `(content, disabled)`, with content trimmed of surrounding
    /// whitespace but otherwise byte-equal.
    #[must_use]
    pub fn same_records(&self, other: &Self) -> bool {
        fn normalized(records: &[Record]) -> Vec<(String, bool)> {
            let mut pairs: Vec<(String, bool)> = records
                .iter()
                .map(|r| (r.content.trim().to_string(), r.disabled))
                .collect();
            pairs.sort();
            pairs
        }

        normalized(&self.records) == normalized(&other.records)
    }
}

/// A zone as exposed by the PowerDNS API.
///
/// List responses omit `rrsets`; zone detail responses include them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Canonical zone name with trailing dot
    pub name: String,
    /// Zone kind
    #[serde(default)]
    pub kind: ZoneKind,
    /// SOA serial as reported by the replica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    /// Ordered nameserver FQDNs; only meaningful on zone creation, empty on
    /// reads (PowerDNS reports nameservers through the apex NS rrset)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// SOA-EDIT-API metadata value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_edit_api: Option<String>,
    /// Full record sets; absent in list responses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rrsets: Vec<RecordSet>,
}

impl Zone {
    /// The effective nameserver FQDNs of this zone, lowercased and
    /// trailing-dot normalized.
    ///
    /// Uses the explicit `nameservers` field when populated (zone creation
    /// payloads, some test fixtures) and falls back to the apex NS rrset,
    /// which is how PowerDNS reports nameservers on reads.
    #[must_use]
    pub fn nameserver_fqdns(&self) -> Vec<String> {
        if !self.nameservers.is_empty() {
            return self
                .nameservers
                .iter()
                .map(|ns| ensure_trailing_dot(&ns.to_lowercase()))
                .collect();
        }

        self.rrsets
            .iter()
            .filter(|rrset| rrset.rtype == "NS" && rrset.name == self.name)
            .flat_map(|rrset| rrset.records.iter())
            .map(|r| ensure_trailing_dot(&r.content.trim().to_lowercase()))
            .collect()
    }
}

/// The kind of mutation applied to one rrset in a zone patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// Upsert the rrset with the supplied records and TTL
    Replace,
    /// Remove the `(name, type)` entirely
    Delete,
}

/// One rrset mutation within a `patch_zone` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RrsetChange {
    /// Fully qualified record name with trailing dot
    pub name: String,
    /// Uppercase RR type string
    #[serde(rename = "type")]
    pub rtype: String,
    /// Whether this change replaces or deletes the rrset
    pub changetype: ChangeType,
    /// New TTL; only present on `REPLACE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    /// New records; empty on `DELETE`
    #[serde(default)]
    pub records: Vec<Record>,
}

impl RrsetChange {
    /// Build a `REPLACE` change from a desired rrset.
    #[must_use]
    pub fn replace(rrset: &RecordSet) -> Self {
        Self {
            name: rrset.name.clone(),
            rtype: rrset.rtype.clone(),
            changetype: ChangeType::Replace,
            ttl: Some(rrset.ttl),
            records: rrset.records.clone(),
        }
    }

    /// Build a `DELETE` change for a `(name, type)` key.
    #[must_use]
    pub fn delete(name: impl Into<String>, rtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rtype: rtype.into(),
            changetype: ChangeType::Delete,
            ttl: None,
            records: Vec::new(),
        }
    }
}

/// Append a trailing dot unless the name already ends with one.
#[must_use]
pub fn ensure_trailing_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Strip a single trailing dot if present.
#[must_use]
pub fn strip_trailing_dot(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Fully qualify a record name against its zone apex.
///
/// Already-qualified names (trailing dot) pass through; `@` and the empty
/// string resolve to the apex itself; anything else gets the apex appended.
#[must_use]
pub fn qualify(name: &str, zone_apex: &str) -> String {
    let apex = ensure_trailing_dot(zone_apex);
    if name.is_empty() || name == "@" {
        apex
    } else if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.{apex}")
    }
}

/// Parse a comma-separated managed-type list into the canonical uppercase
/// set. Blank entries are ignored; an all-blank input yields the default set.
#[must_use]
pub fn parse_managed_types(raw: &str) -> HashSet<String> {
    let parsed: HashSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_uppercase)
        .collect();

    if parsed.is_empty() {
        default_managed_types()
    } else {
        parsed
    }
}

/// The default managed-type set as an owned `HashSet`.
#[must_use]
pub fn default_managed_types() -> HashSet<String> {
    DEFAULT_MANAGED_TYPES
        .iter()
        .map(|t| (*t).to_string())
        .collect()
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
