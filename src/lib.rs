//! # Tablesnap
//!
//! Consistent catalog snapshots for distributed database backups.
//!
//! The work is split across crates:
//!
//! - [`types`]: identities, query elements, definitions, entries and the
//!   catalog and coordination traits
//! - [`collector`]: the fixed-point catalog scan and the staged pipeline
//! - `testing` (feature `testing`): in-memory catalog and coordination

pub use tablesnap_collector as collector;
pub use tablesnap_core as types;
#[cfg(feature = "testing")]
pub use tablesnap_testing as testing;

pub use tablesnap_collector::{BackupEntriesCollector, CollectorConfig, LocalBackupCoordination};
pub use tablesnap_core::{
    BackupCoordination, BackupEntries, BackupEntry, BackupEntrySink, BackupError,
    BackupQueryElement, BackupResult, BackupSettings, Catalog, Database, QualifiedTableName,
    Stage, Storage, TableKey,
};
