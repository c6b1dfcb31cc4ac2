//! Property-Based Tests for Naming and Scan Convergence
//!
//! These tests check properties that must hold for any names and any
//! catalog contents: file-name escaping is reversible and path-safe, table
//! keys order by name before the temporary flag, and a catalog nobody
//! mutates is always accepted on the second pass.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tablesnap::types::{escape_for_file_name, unescape_for_file_name};
use tablesnap::{
    BackupEntriesCollector, BackupQueryElement, BackupSettings, CollectorConfig,
    LocalBackupCoordination, QualifiedTableName, TableKey,
};
use tablesnap_testing::MemoryCatalog;

// Strategy for generating database and table names
fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").unwrap()
}

// Strategy for generating a catalog layout: database name -> table names
fn layout_strategy() -> impl Strategy<Value = Vec<(String, BTreeSet<String>)>> {
    prop::collection::btree_map(
        identifier_strategy(),
        prop::collection::btree_set(identifier_strategy(), 0..5),
        0..4,
    )
    .prop_map(|layout| layout.into_iter().collect())
}

proptest! {
    /// Property: escaping is reversible
    #[test]
    fn prop_escape_round_trips(name in ".{0,32}") {
        let escaped = escape_for_file_name(&name);
        prop_assert_eq!(unescape_for_file_name(&escaped), Some(name));
    }

    /// Property: escaped names never contain path separators or dots
    #[test]
    fn prop_escaped_names_are_path_safe(name in ".{0,32}") {
        let escaped = escape_for_file_name(&name);
        prop_assert!(!escaped.contains('/'));
        prop_assert!(!escaped.contains('.'));
        prop_assert!(escaped.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '%'));
    }

    /// Property: keys order by qualified name, then by the temporary flag
    #[test]
    fn prop_table_key_order(
        a in (identifier_strategy(), identifier_strategy(), any::<bool>()),
        b in (identifier_strategy(), identifier_strategy(), any::<bool>()),
    ) {
        let left = TableKey::new(QualifiedTableName::new(&a.0, &a.1), a.2);
        let right = TableKey::new(QualifiedTableName::new(&b.0, &b.1), b.2);

        let by_name = (&a.0, &a.1).cmp(&(&b.0, &b.1));
        let expected = by_name.then(a.2.cmp(&b.2));
        prop_assert_eq!(left.cmp(&right), expected);
    }

    /// Property: an unchanging catalog converges in exactly two passes and
    /// every table appears once
    #[test]
    fn prop_static_catalog_converges_in_two_passes(layout in layout_strategy()) {
        tokio_test::block_on(async {
            let catalog = MemoryCatalog::new();
            let mut expected_tables = 0;
            for (database, tables) in &layout {
                catalog.create_database(database).unwrap();
                for table in tables {
                    catalog.create_table(database, table, "Memory").unwrap();
                    expected_tables += 1;
                }
            }

            let mut collector = BackupEntriesCollector::new(
                vec![BackupQueryElement::all()],
                BackupSettings { structure_only: true, ..Default::default() },
                Arc::new(LocalBackupCoordination::new()),
                Arc::new(catalog.clone()),
                CollectorConfig::default().with_timeout(Some(Duration::from_secs(10))),
            );
            let entries = collector.get_backup_entries().await.unwrap();

            assert_eq!(collector.scan_stats().unwrap().passes, 2);
            assert_eq!(collector.table_infos().count(), expected_tables);
            assert_eq!(collector.database_infos().count(), layout.len());
            assert_eq!(entries.len(), layout.len() + expected_tables);
            assert_eq!(catalog.database_listings(), 2);
        });
    }
}
