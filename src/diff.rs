// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record-set diffing between source and replica zone state.
//!
//! [`diff_rrsets`] is a pure function computing the minimum sequence of
//! `REPLACE`/`DELETE` changes that converges a replica zone toward the
//! source. Only rrsets whose type is in the managed set are ever emitted;
//! everything else on the replica is invisible to the diff and therefore
//! preserved. `REPLACE` and `DELETE` never share a `(name, type)` key.

use crate::model::{RecordSet, RrsetChange};
use std::collections::{BTreeMap, HashSet};

/// Compute the rrset changes needed to make `replica` match `source`.
///
/// - A source rrset absent from the replica, or present with a different
///   TTL or record multiset, yields a `REPLACE` with the source values.
/// - A managed replica rrset absent from the source yields a `DELETE`.
/// - Rrsets of unmanaged types are never emitted in either direction.
///
/// Output is ordered: replacements first, then deletions, each sorted by
/// `(name, type)` so patches and logs are deterministic.
#[must_use]
pub fn diff_rrsets(
    source: &[RecordSet],
    replica: &[RecordSet],
    managed_types: &HashSet<String>,
) -> Vec<RrsetChange> {
    let source_by_key: BTreeMap<(String, String), &RecordSet> = source
        .iter()
        .filter(|r| managed_types.contains(&r.rtype))
        .map(|r| (r.key(), r))
        .collect();
    let replica_by_key: BTreeMap<(String, String), &RecordSet> = replica
        .iter()
        .filter(|r| managed_types.contains(&r.rtype))
        .map(|r| (r.key(), r))
        .collect();

    let mut changes = Vec::new();

    for (key, desired) in &source_by_key {
        let needs_replace = match replica_by_key.get(key) {
            None => true,
            Some(current) => current.ttl != desired.ttl || !current.same_records(desired),
        };
        if needs_replace {
            changes.push(RrsetChange::replace(desired));
        }
    }

    for key in replica_by_key.keys() {
        if !source_by_key.contains_key(key) {
            changes.push(RrsetChange::delete(key.0.clone(), key.1.clone()));
        }
    }

    changes
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
