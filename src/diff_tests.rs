// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `diff.rs`

#[cfg(test)]
mod tests {
    use super::super::diff_rrsets;
    use crate::model::{default_managed_types, ChangeType, Record, RecordSet};

    fn rrset(name: &str, rtype: &str, ttl: u32, contents: &[&str]) -> RecordSet {
        RecordSet {
            name: name.to_string(),
            rtype: rtype.to_string(),
            ttl,
            records: contents.iter().map(|c| Record::new(*c)).collect(),
            comments: Vec::new(),
        }
    }

    /// A source rrset missing from the replica becomes a REPLACE
    #[test]
    fn test_new_rrset_replaced() {
        let source = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1"])];
        let changes = diff_rrsets(&source, &[], &default_managed_types());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changetype, ChangeType::Replace);
        assert_eq!(changes[0].name, "www.example.com.");
        assert_eq!(changes[0].ttl, Some(300));
        assert_eq!(changes[0].records, vec![Record::new("10.0.0.1")]);
    }

    /// A TTL change alone triggers a REPLACE carrying the source TTL
    #[test]
    fn test_ttl_change_replaced() {
        let source = vec![rrset("www.example.com.", "A", 600, &["10.0.0.1"])];
        let replica = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1"])];
        let changes = diff_rrsets(&source, &replica, &default_managed_types());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changetype, ChangeType::Replace);
        assert_eq!(changes[0].ttl, Some(600));
    }

    /// A value change triggers a REPLACE with the full source record list
    #[test]
    fn test_value_change_replaced() {
        let source = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1", "10.0.0.2"])];
        let replica = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1"])];
        let changes = diff_rrsets(&source, &replica, &default_managed_types());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].records.len(), 2);
    }

    /// A managed replica rrset with no source counterpart is deleted
    #[test]
    fn test_orphan_rrset_deleted() {
        let replica = vec![rrset("ftp.example.com.", "A", 300, &["10.0.0.9"])];
        let changes = diff_rrsets(&[], &replica, &default_managed_types());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changetype, ChangeType::Delete);
        assert_eq!(changes[0].name, "ftp.example.com.");
        assert_eq!(changes[0].rtype, "A");
        assert!(changes[0].records.is_empty());
    }

    /// Matching state yields no changes
    #[test]
    fn test_converged_is_empty() {
        let rrsets = vec![
            rrset("example.com.", "MX", 3600, &["10 mail.example.com."]),
            rrset("www.example.com.", "A", 300, &["10.0.0.1"]),
        ];
        assert!(diff_rrsets(&rrsets, &rrsets.clone(), &default_managed_types()).is_empty());
    }

    /// Record ordering differences are not drift
    #[test]
    fn test_record_order_is_not_drift() {
        let source = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1", "10.0.0.2"])];
        let replica = vec![rrset("www.example.com.", "A", 300, &["10.0.0.2", "10.0.0.1"])];
        assert!(diff_rrsets(&source, &replica, &default_managed_types()).is_empty());
    }

    /// Unmanaged replica rrsets are never deleted
    #[test]
    fn test_unmanaged_types_preserved() {
        let replica = vec![
            rrset("example.com.", "DNSKEY", 3600, &["257 3 13 abcdef=="]),
            rrset("ftp.example.com.", "A", 300, &["10.0.0.9"]),
        ];
        let changes = diff_rrsets(&[], &replica, &default_managed_types());

        assert_eq!(changes.len(), 1, "only the managed A rrset is touched");
        assert_eq!(changes[0].rtype, "A");
    }

    /// Unmanaged source rrsets are never emitted either
    #[test]
    fn test_unmanaged_source_types_not_emitted() {
        let source = vec![rrset("example.com.", "DNSKEY", 3600, &["257 3 13 abcdef=="])];
        assert!(diff_rrsets(&source, &[], &default_managed_types()).is_empty());
    }

    /// A narrowed managed set scopes both directions of the diff
    #[test]
    fn test_custom_managed_set() {
        let managed: std::collections::HashSet<String> = ["A".to_string()].into();
        let source = vec![
            rrset("www.example.com.", "A", 300, &["10.0.0.1"]),
            rrset("example.com.", "TXT", 300, &["\"v=spf1 -all\""]),
        ];
        let replica = vec![rrset("old.example.com.", "TXT", 300, &["\"stale\""])];

        let changes = diff_rrsets(&source, &replica, &managed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].rtype, "A");
        assert_eq!(changes[0].changetype, ChangeType::Replace);
    }

    /// REPLACE and DELETE never target the same (name, type)
    #[test]
    fn test_replace_delete_disjoint() {
        let source = vec![
            rrset("www.example.com.", "A", 600, &["10.0.0.1"]),
            rrset("new.example.com.", "A", 300, &["10.0.0.5"]),
        ];
        let replica = vec![
            rrset("www.example.com.", "A", 300, &["10.0.0.1"]),
            rrset("old.example.com.", "A", 300, &["10.0.0.4"]),
        ];

        let changes = diff_rrsets(&source, &replica, &default_managed_types());
        let mut seen = std::collections::HashSet::new();
        for change in &changes {
            assert!(
                seen.insert((change.name.clone(), change.rtype.clone())),
                "duplicate key in change list"
            );
        }
        assert_eq!(changes.len(), 3);
    }

    /// Replacements come before deletions, each block sorted by key
    #[test]
    fn test_deterministic_ordering() {
        let source = vec![
            rrset("b.example.com.", "A", 300, &["10.0.0.2"]),
            rrset("a.example.com.", "A", 300, &["10.0.0.1"]),
        ];
        let replica = vec![
            rrset("z.example.com.", "A", 300, &["10.0.0.9"]),
            rrset("y.example.com.", "A", 300, &["10.0.0.8"]),
        ];

        let changes = diff_rrsets(&source, &replica, &default_managed_types());
        let summary: Vec<(ChangeType, &str)> = changes
            .iter()
            .map(|c| (c.changetype, c.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ChangeType::Replace, "a.example.com."),
                (ChangeType::Replace, "b.example.com."),
                (ChangeType::Delete, "y.example.com."),
                (ChangeType::Delete, "z.example.com."),
            ]
        );
    }

    /// Same name under different types are independent rrsets
    #[test]
    fn test_name_type_identity() {
        let source = vec![rrset("www.example.com.", "A", 300, &["10.0.0.1"])];
        let replica = vec![rrset("www.example.com.", "AAAA", 300, &["2001:db8::1"])];

        let changes = diff_rrsets(&source, &replica, &default_managed_types());
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .any(|c| c.rtype == "A" && c.changetype == ChangeType::Replace));
        assert!(changes
            .iter()
            .any(|c| c.rtype == "AAAA" && c.changetype == ChangeType::Delete));
    }
}
