//! # Tablesnap Collector
//!
//! Collects the entries one host contributes to a backup while the catalog
//! keeps changing underneath.
//!
//! The [`BackupEntriesCollector`] drives a host through the backup stages,
//! synchronizing with the other hosts at every stage boundary. Inside, a
//! [`CatalogScanner`] finds a consistent set of databases and tables, an
//! [`EntryEmitter`] turns it into definition and data entries, and the
//! post-collection tasks queued by storages are drained before the entry
//! list is sealed.

pub mod collector;
pub mod config;
pub mod coordination;
pub mod emit;
pub mod paths;
pub mod scan;
pub mod sink;
pub mod sync;
pub mod tasks;

pub use collector::BackupEntriesCollector;
pub use config::{CollectorConfig, CollectorConfigBuilder, ConfigError};
pub use coordination::LocalBackupCoordination;
pub use emit::EntryEmitter;
pub use scan::{CatalogScanner, CatalogSnapshot, DatabaseInfo, ScanOptions, ScanStats, TableInfo};
pub use sink::EntryCollection;
pub use sync::StageSynchronizer;
pub use tasks::PostTaskQueue;
