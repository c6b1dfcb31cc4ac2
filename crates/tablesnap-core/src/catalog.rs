//! Catalog and storage seams
//!
//! The collector never owns the catalog. It reads it through these traits,
//! which a database engine implements over its live, concurrently mutated
//! state. Object identity matters: the catalog must hand out the same `Arc`
//! for the same database or table object, because the collector detects
//! renames by comparing the handles it gets from different lookups.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::create_query::CreateQuery;
use crate::entry::{BackupEntries, BackupEntry};
use crate::error::{BackupError, BackupResult};
use crate::identifiers::QualifiedTableName;
use crate::query::Partition;

/// Shared handle to a database object
pub type DatabasePtr = Arc<dyn Database>;

/// Shared handle to a table's storage object
pub type StoragePtr = Arc<dyn Storage>;

/// Whether two handles point at the same object
pub fn same_object<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
}

/// Read access to the set of databases and tables
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a table and its database.
    ///
    /// Temporary tables are looked up by `name.table` alone.
    ///
    /// # Errors
    ///
    /// `UnknownTable` or `UnknownDatabase` if the table cannot be resolved.
    async fn get_database_and_table(
        &self,
        name: &QualifiedTableName,
        temporary: bool,
    ) -> BackupResult<(DatabasePtr, StoragePtr)>;

    /// Best-effort variant of [`Catalog::get_database_and_table`]
    async fn try_get_database_and_table(
        &self,
        name: &QualifiedTableName,
        temporary: bool,
    ) -> BackupResult<Option<(DatabasePtr, StoragePtr)>> {
        match self.get_database_and_table(name, temporary).await {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_concurrently_dropped() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a database.
    ///
    /// # Errors
    ///
    /// `UnknownDatabase` if there is no such database.
    async fn get_database(&self, name: &str) -> BackupResult<DatabasePtr>;

    /// Best-effort variant of [`Catalog::get_database`]
    async fn try_get_database(&self, name: &str) -> BackupResult<Option<DatabasePtr>> {
        match self.get_database(name).await {
            Ok(database) => Ok(Some(database)),
            Err(e) if e.is_concurrently_dropped() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All databases with their current names
    async fn databases(&self) -> BackupResult<Vec<(String, DatabasePtr)>>;
}

/// A database object
#[async_trait]
pub trait Database: Send + Sync {
    /// Definition of the database as it should be stored in a backup.
    ///
    /// May fail with `DatabaseIsDropped` if the database was just dropped.
    async fn create_database_query_for_backup(&self) -> BackupResult<CreateQuery>;

    /// Names of the tables to consider for a backup, in no particular order.
    ///
    /// Each call starts a fresh enumeration.
    async fn tables_for_backup(&self) -> BackupResult<Vec<String>>;
}

/// A table's storage object
#[async_trait]
pub trait Storage: Send + Sync {
    /// Current name of the table
    fn storage_id(&self) -> QualifiedTableName;

    /// Name of the table engine, used in error messages
    fn engine_name(&self) -> String;

    /// Acquire a shared lock that keeps the table from being dropped or
    /// altered while the returned holder is alive.
    ///
    /// # Errors
    ///
    /// `LockTimeout` if the lock is not acquired within `timeout`, and
    /// `TableIsDropped` if the table was dropped.
    async fn lock_for_share(&self, query_id: &str, timeout: Duration)
    -> BackupResult<TableLockHolder>;

    /// Definition of the table as it should be stored in a backup.
    ///
    /// May fail with `TableIsDropped` if the table was just dropped.
    async fn create_query_for_backup(&self) -> BackupResult<CreateQuery>;

    /// Append the table's data to the backup under `data_path_in_backup`.
    ///
    /// The default has no data to back up and refuses partition filters.
    async fn backup_data(
        &self,
        sink: &mut dyn BackupEntrySink,
        data_path_in_backup: &str,
        partitions: Option<&[Partition]>,
    ) -> BackupResult<()> {
        let _ = (sink, data_path_in_backup);
        if partitions.is_some() {
            return Err(BackupError::partitions_not_supported(
                self.storage_id(),
                self.engine_name(),
            ));
        }
        Ok(())
    }
}

/// Deferred action run after all data entries were collected
pub type PostCollectingTask =
    Box<dyn FnOnce(&mut dyn BackupEntrySink) -> BackupResult<()> + Send>;

/// What storages and databases may contribute while entries are collected.
///
/// Every method fails with a `LogicalError` once the entry list is sealed.
pub trait BackupEntrySink: Send {
    fn add_backup_entry(&mut self, entry: BackupEntry) -> BackupResult<()>;

    fn add_backup_entries(&mut self, entries: BackupEntries) -> BackupResult<()>;

    fn add_post_collecting_task(&mut self, task: PostCollectingTask) -> BackupResult<()>;
}

/// A held table lock; released when dropped
pub struct TableLockHolder {
    _guard: Box<dyn Any + Send + Sync>,
}

impl TableLockHolder {
    pub fn new<G: Any + Send + Sync>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    /// Holder for storages that need no locking
    pub fn none() -> Self {
        Self::new(())
    }
}

impl fmt::Debug for TableLockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLockHolder").finish_non_exhaustive()
    }
}
