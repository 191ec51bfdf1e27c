// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end synchronization scenarios against in-memory peers.
//!
//! These tests run the public engine API over a fake NetBox and a stateful
//! fake PowerDNS through several rounds of source changes, asserting that
//! the replica converges after every round and that foreign zones survive
//! the whole lifecycle untouched.

use async_trait::async_trait;
use netbox_pdns::errors::{ReplicaError, SourceError};
use netbox_pdns::model::{
    default_managed_types, ChangeType, Record, RecordSet, RrsetChange, Zone, ZoneKind,
};
use netbox_pdns::netbox::{build_rrsets, NameserverRef, SourceApi, SourceRecord, SourceZone};
use netbox_pdns::pdns::ReplicaApi;
use netbox_pdns::reconciler::{ZoneOutcome, ZoneReconciler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const NS_ID: u64 = 7;

/// Mutable fake NetBox: zones and records behind a lock so tests can edit
/// the source between sync rounds.
#[derive(Default)]
struct FakeNetbox {
    zones: Mutex<Vec<SourceZone>>,
    records: Mutex<HashMap<u64, Vec<SourceRecord>>>,
}

impl FakeNetbox {
    fn put_zone(&self, zone: SourceZone, records: Vec<SourceRecord>) {
        self.records.lock().unwrap().insert(zone.id, records);
        let mut zones = self.zones.lock().unwrap();
        zones.retain(|z| z.id != zone.id);
        zones.push(zone);
    }

    fn remove_zone(&self, id: u64) {
        self.zones.lock().unwrap().retain(|z| z.id != id);
        self.records.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl SourceApi for FakeNetbox {
    async fn get_nameserver(&self, id: u64) -> Result<NameserverRef, SourceError> {
        Ok(NameserverRef {
            id,
            name: "ns1.example.net".to_string(),
        })
    }

    async fn list_owned_zones(&self, nameserver_id: u64) -> Result<Vec<SourceZone>, SourceError> {
        Ok(self
            .zones
            .lock()
            .unwrap()
            .iter()
            .filter(|z| z.is_served_by(nameserver_id))
            .cloned()
            .collect())
    }

    async fn get_zone(&self, zone_id: u64) -> Result<SourceZone, SourceError> {
        self.zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.id == zone_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                zone: format!("zone {zone_id}"),
            })
    }

    async fn get_zone_by_name(&self, name: &str) -> Result<Option<SourceZone>, SourceError> {
        Ok(self
            .zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.name == name)
            .cloned())
    }

    async fn get_zone_records(&self, zone_id: u64) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&zone_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Stateful fake PowerDNS that applies creates, patches, and deletes to an
/// in-memory zone store.
#[derive(Default)]
struct FakePowerDns {
    zones: Mutex<HashMap<String, Zone>>,
}

impl FakePowerDns {
    fn zone(&self, name: &str) -> Option<Zone> {
        self.zones.lock().unwrap().get(name).cloned()
    }

    fn insert(&self, zone: Zone) {
        self.zones.lock().unwrap().insert(zone.name.clone(), zone);
    }
}

#[async_trait]
impl ReplicaApi for FakePowerDns {
    async fn get_zone(&self, name: &str) -> Result<Option<Zone>, ReplicaError> {
        Ok(self.zones.lock().unwrap().get(name).cloned())
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, ReplicaError> {
        Ok(self
            .zones
            .lock()
            .unwrap()
            .values()
            .map(|z| Zone {
                name: z.name.clone(),
                kind: z.kind,
                serial: None,
                nameservers: Vec::new(),
                soa_edit_api: None,
                rrsets: Vec::new(),
            })
            .collect())
    }

    async fn create_zone(&self, zone: &Zone) -> Result<(), ReplicaError> {
        let mut zones = self.zones.lock().unwrap();
        if zones.contains_key(&zone.name) {
            return Err(ReplicaError::Conflict {
                zone: zone.name.clone(),
            });
        }
        // Materialize the nameservers field as apex NS records, as the real
        // server does on zone creation
        let mut created = zone.clone();
        if !created.nameservers.is_empty() {
            created.rrsets.push(RecordSet {
                name: created.name.clone(),
                rtype: "NS".to_string(),
                ttl: 3600,
                records: created.nameservers.iter().map(Record::new).collect(),
                comments: Vec::new(),
            });
        }
        zones.insert(created.name.clone(), created);
        Ok(())
    }

    async fn patch_zone(&self, name: &str, changes: &[RrsetChange]) -> Result<(), ReplicaError> {
        let mut zones = self.zones.lock().unwrap();
        let zone = zones.get_mut(name).ok_or_else(|| ReplicaError::NotFound {
            zone: name.to_string(),
        })?;
        for change in changes {
            zone.rrsets
                .retain(|r| !(r.name == change.name && r.rtype == change.rtype));
            if change.changetype == ChangeType::Replace {
                zone.rrsets.push(RecordSet {
                    name: change.name.clone(),
                    rtype: change.rtype.clone(),
                    ttl: change.ttl.unwrap_or_default(),
                    records: change.records.clone(),
                    comments: Vec::new(),
                });
            }
        }
        Ok(())
    }

    async fn delete_zone(&self, name: &str) -> Result<(), ReplicaError> {
        self.zones.lock().unwrap().remove(name);
        Ok(())
    }
}

fn our_nameserver() -> NameserverRef {
    NameserverRef {
        id: NS_ID,
        name: "ns1.example.net".to_string(),
    }
}

fn source_zone(id: u64, name: &str, serial: u32) -> SourceZone {
    SourceZone {
        id,
        name: name.to_string(),
        soa_serial: Some(serial),
        default_ttl: Some(300),
        nameservers: vec![our_nameserver()],
    }
}

fn source_record(name: &str, rtype: &str, value: &str, ttl: u32) -> SourceRecord {
    SourceRecord {
        fqdn: None,
        name: name.to_string(),
        rtype: rtype.to_string(),
        value: value.to_string(),
        ttl: Some(ttl),
    }
}

/// The apex NS record the NetBox DNS plugin auto-generates for every zone
fn apex_ns_record() -> SourceRecord {
    source_record("@", "NS", "ns1.example.net.", 3600)
}

fn setup() -> (Arc<FakeNetbox>, Arc<FakePowerDns>, ZoneReconciler) {
    let netbox = Arc::new(FakeNetbox::default());
    let pdns = Arc::new(FakePowerDns::default());
    let source: Arc<dyn SourceApi> = netbox.clone();
    let replica: Arc<dyn ReplicaApi> = pdns.clone();
    let reconciler = ZoneReconciler::new(source, replica, NS_ID, default_managed_types());
    (netbox, pdns, reconciler)
}

/// Managed rrsets on the replica after a sync equal the source projection
fn assert_converged(netbox: &FakeNetbox, pdns: &FakePowerDns, zone_id: u64, replica_name: &str) {
    let zone = netbox
        .zones
        .lock()
        .unwrap()
        .iter()
        .find(|z| z.id == zone_id)
        .cloned()
        .expect("zone in source");
    let records = netbox.records.lock().unwrap().get(&zone_id).cloned().unwrap_or_default();
    let desired = build_rrsets(&zone, &records);

    let replica_zone = pdns.zone(replica_name).expect("zone on replica");
    let managed = default_managed_types();
    let mut actual: Vec<RecordSet> = replica_zone
        .rrsets
        .into_iter()
        .filter(|r| managed.contains(&r.rtype))
        .collect();
    actual.sort_by(|a, b| a.key().cmp(&b.key()));

    assert_eq!(actual, desired, "replica diverged for {replica_name}");
}

/// A zone's whole lifecycle: creation, record drift, rrset removal, and
/// final deletion, converging after every round
#[tokio::test]
async fn test_zone_lifecycle_converges() {
    let (netbox, pdns, reconciler) = setup();

    // Round 1: new zone appears in NetBox
    netbox.put_zone(
        source_zone(1, "example.com", 100),
        vec![apex_ns_record(), source_record("www", "A", "10.0.0.1", 300)],
    );
    let report = reconciler.full_sync("schedule").await.unwrap();
    assert_eq!(report.created, 1);
    assert_converged(&netbox, &pdns, 1, "example.com.");

    // Round 2: TTL bump and an extra record
    netbox.put_zone(
        source_zone(1, "example.com", 101),
        vec![
            apex_ns_record(),
            source_record("www", "A", "10.0.0.1", 600),
            source_record("mail", "MX", "10 mail.example.com.", 300),
        ],
    );
    let report = reconciler.full_sync("schedule").await.unwrap();
    assert_eq!(report.updated, 1);
    assert_converged(&netbox, &pdns, 1, "example.com.");

    // Round 3: the www record disappears
    netbox.put_zone(
        source_zone(1, "example.com", 102),
        vec![
            apex_ns_record(),
            source_record("mail", "MX", "10 mail.example.com.", 300),
        ],
    );
    reconciler.full_sync("schedule").await.unwrap();
    assert_converged(&netbox, &pdns, 1, "example.com.");
    assert!(!pdns
        .zone("example.com.")
        .unwrap()
        .rrsets
        .iter()
        .any(|r| r.name == "www.example.com."));

    // Round 4: the zone leaves NetBox and is pruned from the replica
    netbox.remove_zone(1);
    let report = reconciler.full_sync("schedule").await.unwrap();
    assert_eq!(report.pruned, 1);
    assert!(pdns.zone("example.com.").is_none());
}

/// A stable source yields zero mutations on repeated syncs
#[tokio::test]
async fn test_steady_state_is_quiet() {
    let (netbox, pdns, reconciler) = setup();
    netbox.put_zone(
        source_zone(1, "example.com", 100),
        vec![apex_ns_record(), source_record("www", "A", "10.0.0.1", 300)],
    );

    reconciler.full_sync("schedule").await.unwrap();
    let snapshot = pdns.zone("example.com.");

    let report = reconciler.full_sync("schedule").await.unwrap();
    assert_eq!(report.created + report.updated + report.deleted + report.pruned, 0);
    assert_eq!(report.in_sync, 1);
    assert_eq!(pdns.zone("example.com."), snapshot);
}

/// Foreign zones on the replica survive the full lifecycle untouched
#[tokio::test]
async fn test_foreign_zone_untouched() {
    let (netbox, pdns, reconciler) = setup();

    let foreign = Zone {
        name: "foreign.org.".to_string(),
        kind: ZoneKind::Native,
        serial: Some(1),
        nameservers: Vec::new(),
        soa_edit_api: None,
        rrsets: vec![RecordSet {
            name: "foreign.org.".to_string(),
            rtype: "NS".to_string(),
            ttl: 3600,
            records: vec![Record::new("ns.other.net.")],
            comments: Vec::new(),
        }],
    };
    pdns.insert(foreign.clone());

    netbox.put_zone(
        source_zone(1, "example.com", 100),
        vec![apex_ns_record(), source_record("www", "A", "10.0.0.1", 300)],
    );
    reconciler.full_sync("schedule").await.unwrap();

    netbox.remove_zone(1);
    reconciler.full_sync("schedule").await.unwrap();

    assert_eq!(pdns.zone("foreign.org."), Some(foreign));
}

/// Zone-level events and full syncs agree: a webhook-style single-zone
/// reconcile reaches the same state as a full sync
#[tokio::test]
async fn test_single_zone_reconcile_matches_full_sync() {
    let (netbox, pdns, reconciler) = setup();
    netbox.put_zone(
        source_zone(1, "example.com", 100),
        vec![apex_ns_record(), source_record("www", "A", "10.0.0.1", 300)],
    );

    let outcome = reconciler.reconcile("example.com").await.unwrap();
    assert_eq!(outcome, ZoneOutcome::Created);
    assert_converged(&netbox, &pdns, 1, "example.com.");

    // Drift, then reconcile just that zone again
    netbox.put_zone(
        source_zone(1, "example.com", 101),
        vec![apex_ns_record(), source_record("www", "A", "10.0.0.2", 300)],
    );
    let outcome = reconciler.reconcile("example.com.").await.unwrap();
    assert!(matches!(outcome, ZoneOutcome::Updated { .. }));
    assert_converged(&netbox, &pdns, 1, "example.com.");
}
