// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone reconciliation: converging replica zones toward source state.
//!
//! [`ZoneReconciler::reconcile`] synchronizes a single zone end-to-end:
//! fetch the source zone, create the replica zone if missing, diff and patch
//! if present, and delete the replica zone when the source no longer has it
//! and the zone is ours. [`ZoneReconciler::full_sync`] runs that over every
//! owned zone and prunes orphaned replica zones.
//!
//! Ownership is decided by nameservers alone: a source zone is in scope iff
//! the configured nameserver object serves it, and a replica zone is ours
//! iff its nameserver set contains that nameserver's FQDN. No side tables.

use crate::diff::diff_rrsets;
use crate::errors::{ReplicaError, SyncError};
use crate::model::{ensure_trailing_dot, strip_trailing_dot, Zone, ZoneKind};
use crate::netbox::{build_rrsets, SourceApi, SourceZone};
use crate::pdns::ReplicaApi;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a single-zone reconcile ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOutcome {
    /// The zone was missing on the replica and has been created
    Created,
    /// The zone drifted and a patch was applied
    Updated {
        /// Number of rrset changes in the patch
        changes: usize,
    },
    /// Source and replica already agree (serial match or empty diff)
    InSync,
    /// The zone left the source and was deleted from the replica
    Deleted,
    /// The replica zone is not managed by this engine; left untouched
    SkippedForeign,
    /// The zone exists on neither side
    Absent,
}

/// Aggregated result of a full synchronization run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Number of owned zones enumerated in the source
    pub zones: usize,
    /// Zones created on the replica
    pub created: usize,
    /// Zones patched on the replica
    pub updated: usize,
    /// Zones already convergent
    pub in_sync: usize,
    /// Zones deleted through the per-zone path
    pub deleted: usize,
    /// Orphaned replica zones pruned
    pub pruned: usize,
    /// Per-zone failures as `(zone, error)`; the run continues past them
    pub failed: Vec<(String, String)>,
}

/// Whether a replica zone is managed by this engine.
///
/// True iff the configured nameserver's FQDN (lowercased, trailing dot)
/// appears in the zone's nameserver set. This is the only ownership marker.
#[must_use]
pub fn zone_is_managed(zone: &Zone, nameserver_fqdn: &str) -> bool {
    zone.nameserver_fqdns()
        .iter()
        .any(|ns| ns == nameserver_fqdn)
}

/// Orchestrates single-zone and full synchronization against the clients.
pub struct ZoneReconciler {
    source: Arc<dyn SourceApi>,
    replica: Arc<dyn ReplicaApi>,
    nameserver_id: u64,
    managed_types: HashSet<String>,
}

impl ZoneReconciler {
    /// Create a reconciler for the given nameserver identity and managed
    /// type set.
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceApi>,
        replica: Arc<dyn ReplicaApi>,
        nameserver_id: u64,
        managed_types: HashSet<String>,
    ) -> Self {
        Self {
            source,
            replica,
            nameserver_id,
            managed_types,
        }
    }

    /// The configured nameserver's FQDN in replica form.
    async fn nameserver_fqdn(&self) -> Result<String, SyncError> {
        let nameserver = self.source.get_nameserver(self.nameserver_id).await?;
        Ok(ensure_trailing_dot(&nameserver.name.to_lowercase()))
    }

    /// Synchronize a single zone end-to-end.
    ///
    /// Accepts the zone name in either source form (`example.com`) or
    /// replica form (`example.com.`).
    ///
    /// # Errors
    ///
    /// Propagates source and replica failures that survived client-layer
    /// retry. A zone missing from the source is not an error; it drives the
    /// replica-delete path.
    pub async fn reconcile(&self, zone_name: &str) -> Result<ZoneOutcome, SyncError> {
        let apex = strip_trailing_dot(zone_name.trim()).to_lowercase();
        let replica_name = ensure_trailing_dot(&apex);
        debug!(zone = %replica_name, "reconciling zone");

        let source_zone = self.source.get_zone_by_name(&apex).await?;

        match source_zone {
            Some(zone) if zone.is_served_by(self.nameserver_id) => {
                self.converge(&zone, &replica_name).await
            }
            Some(_) => {
                debug!(
                    zone = %replica_name,
                    "zone exists in NetBox but is not served by this nameserver"
                );
                self.delete_if_ours(&replica_name).await
            }
            None => self.delete_if_ours(&replica_name).await,
        }
    }

    /// Create-or-patch path for a zone present and owned in the source.
    async fn converge(&self, zone: &SourceZone, replica_name: &str) -> Result<ZoneOutcome, SyncError> {
        let Some(replica_zone) = self.replica.get_zone(replica_name).await? else {
            return self.create_zone(zone, replica_name).await;
        };

        if let (Some(source_serial), Some(replica_serial)) = (zone.soa_serial, replica_zone.serial) {
            if source_serial == replica_serial {
                info!(
                    zone = %replica_name,
                    serial = source_serial,
                    "serials match, skipping zone synchronization"
                );
                return Ok(ZoneOutcome::InSync);
            }
        }

        let records = self.source.get_zone_records(zone.id).await?;
        let desired = build_rrsets(zone, &records);
        let changes = diff_rrsets(&desired, &replica_zone.rrsets, &self.managed_types);

        if changes.is_empty() {
            debug!(zone = %replica_name, "zone already convergent");
            return Ok(ZoneOutcome::InSync);
        }

        info!(zone = %replica_name, changes = changes.len(), "synchronizing zone");
        self.replica.patch_zone(replica_name, &changes).await?;
        Ok(ZoneOutcome::Updated {
            changes: changes.len(),
        })
    }

    /// Build and create the replica zone from source state.
    async fn create_zone(&self, zone: &SourceZone, replica_name: &str) -> Result<ZoneOutcome, SyncError> {
        info!(zone = %replica_name, "creating zone on replica");

        let records = self.source.get_zone_records(zone.id).await?;
        let rrsets = build_rrsets(zone, &records);

        // PowerDNS materializes the nameservers field as apex NS records;
        // passing both would duplicate any NS rrset the source already has.
        let has_apex_ns = rrsets
            .iter()
            .any(|r| r.rtype == "NS" && r.name == replica_name);
        let nameservers = if has_apex_ns {
            Vec::new()
        } else {
            zone.nameservers
                .iter()
                .map(|ns| ensure_trailing_dot(&ns.name.to_lowercase()))
                .collect()
        };

        let pdns_zone = Zone {
            name: replica_name.to_string(),
            kind: ZoneKind::Native,
            serial: None,
            nameservers,
            soa_edit_api: Some("DEFAULT".to_string()),
            rrsets,
        };

        match self.replica.create_zone(&pdns_zone).await {
            // A conflicting create means someone got there first; the zone
            // exists, which is all this path promises.
            Ok(()) | Err(ReplicaError::Conflict { .. }) => Ok(ZoneOutcome::Created),
            Err(e) => Err(e.into()),
        }
    }

    /// Replica-delete path: remove the zone only when it is ours.
    async fn delete_if_ours(&self, replica_name: &str) -> Result<ZoneOutcome, SyncError> {
        let Some(replica_zone) = self.replica.get_zone(replica_name).await? else {
            debug!(zone = %replica_name, "zone absent from both source and replica");
            return Ok(ZoneOutcome::Absent);
        };

        let nameserver_fqdn = self.nameserver_fqdn().await?;
        if !zone_is_managed(&replica_zone, &nameserver_fqdn) {
            info!(
                zone = %replica_name,
                "zone left the source but is not managed by this nameserver, leaving untouched"
            );
            return Ok(ZoneOutcome::SkippedForeign);
        }

        info!(zone = %replica_name, "deleting zone removed from source");
        self.replica.delete_zone(replica_name).await?;
        Ok(ZoneOutcome::Deleted)
    }

    /// Reconcile every owned zone, then prune replica zones that are no
    /// longer owned but still carry our nameserver.
    ///
    /// Per-zone failures are collected into the report and do not stop the
    /// run. A failure to enumerate owned zones (or to resolve the
    /// nameserver FQDN) aborts before any replica mutation, so a source
    /// outage can never trigger pruning.
    ///
    /// # Errors
    ///
    /// Propagates failures of the three enumeration calls; everything past
    /// them is collected per zone.
    pub async fn full_sync(&self, trigger: &str) -> Result<SyncReport, SyncError> {
        info!(trigger, "starting full synchronization");

        let owned = self.source.list_owned_zones(self.nameserver_id).await?;
        let nameserver_fqdn = self.nameserver_fqdn().await?;
        let replica_zones = self.replica.list_zones().await?;

        let mut report = SyncReport {
            zones: owned.len(),
            ..SyncReport::default()
        };

        for zone in &owned {
            match self.reconcile(&zone.name).await {
                Ok(ZoneOutcome::Created) => report.created += 1,
                Ok(ZoneOutcome::Updated { .. }) => report.updated += 1,
                Ok(ZoneOutcome::InSync) => report.in_sync += 1,
                Ok(ZoneOutcome::Deleted) => report.deleted += 1,
                Ok(ZoneOutcome::SkippedForeign | ZoneOutcome::Absent) => {}
                Err(e) => {
                    error!(zone = %zone.name, error = %e, "zone synchronization failed");
                    report.failed.push((zone.name.clone(), e.to_string()));
                }
            }
        }

        let owned_names: HashSet<String> = owned
            .iter()
            .map(|z| ensure_trailing_dot(&z.name.to_lowercase()))
            .collect();

        for candidate in &replica_zones {
            if owned_names.contains(&candidate.name.to_lowercase()) {
                continue;
            }
            match self.prune_orphan(&candidate.name, &nameserver_fqdn).await {
                Ok(true) => report.pruned += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(zone = %candidate.name, error = %e, "orphan pruning failed");
                    report.failed.push((candidate.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            trigger,
            zones = report.zones,
            created = report.created,
            updated = report.updated,
            in_sync = report.in_sync,
            deleted = report.deleted,
            pruned = report.pruned,
            failed = report.failed.len(),
            "full synchronization finished"
        );
        Ok(report)
    }

    /// Delete one orphan candidate if its nameserver set marks it as ours.
    /// Returns whether a deletion happened.
    async fn prune_orphan(&self, zone_name: &str, nameserver_fqdn: &str) -> Result<bool, SyncError> {
        let Some(zone) = self.replica.get_zone(zone_name).await? else {
            return Ok(false);
        };

        if !zone_is_managed(&zone, nameserver_fqdn) {
            debug!(zone = %zone_name, "foreign zone, leaving untouched");
            return Ok(false);
        }

        info!(zone = %zone_name, "pruning orphaned zone");
        self.replica.delete_zone(zone_name).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
