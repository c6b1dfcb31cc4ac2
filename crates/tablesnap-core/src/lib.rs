//! # Tablesnap Core
//!
//! Core types and collaborator traits for collecting backup entries.
//!
//! ## Contents
//!
//! - **Identities**: [`QualifiedTableName`], [`TableKey`]
//! - **Query model**: [`BackupQueryElement`], [`RenamingMap`]
//! - **Definitions**: [`CreateQuery`]
//! - **Output**: [`BackupEntry`], [`BackupEntryContent`] and file-name escaping
//! - **Seams**: [`Catalog`], [`Database`], [`Storage`], [`BackupEntrySink`],
//!   [`BackupCoordination`]
//! - **Settings**: [`BackupSettings`] and the cluster host utilities
//! - **Errors**: [`BackupError`], [`BackupResult`]

pub mod catalog;
pub mod coordination;
pub mod create_query;
pub mod entry;
pub mod error;
pub mod escape;
pub mod identifiers;
pub mod query;
pub mod renaming;
pub mod settings;
pub mod stage;

pub use catalog::{
    BackupEntrySink, Catalog, Database, DatabasePtr, PostCollectingTask, Storage, StoragePtr,
    TableLockHolder, same_object,
};
pub use coordination::BackupCoordination;
pub use create_query::{CreateQuery, back_quote_if_need};
pub use entry::{
    BackupEntries, BackupEntry, BackupEntryContent, BackupEntryContentPtr, BackupEntryFromMemory,
};
pub use error::{BackupError, BackupResult};
pub use escape::{escape_for_file_name, unescape_for_file_name};
pub use identifiers::{QualifiedTableName, TableKey};
pub use query::{BackupQueryElement, Partition};
pub use renaming::RenamingMap;
pub use settings::{BackupSettings, filter_host_ids, find_shard_num_and_replica_num};
pub use stage::Stage;
