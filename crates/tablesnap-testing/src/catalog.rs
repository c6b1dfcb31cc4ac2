//! # In-Memory Catalog
//!
//! A catalog whose databases and tables can be created, renamed and dropped
//! while a backup scans it. Hooks registered with [`MemoryCatalog::on_event`]
//! run at fixed points of the scan (listing databases, listing the tables of
//! a database, reading a table definition), which lets a test mutate the
//! catalog exactly between two lookups of the same pass.
//!
//! Renames keep the object: a renamed table is the same [`MemoryStorage`]
//! under a new name, as in a real engine.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::RwLock;

use tablesnap_core::{
    BackupEntries, BackupEntry, BackupEntrySink, BackupError, BackupResult, Catalog, CreateQuery,
    Database, DatabasePtr, Partition, QualifiedTableName, Storage, StoragePtr, TableLockHolder,
    escape_for_file_name,
};
use tracing::debug;

/// Name of the database temporary tables belong to
pub const TEMPORARY_DATABASE: &str = "_temporary_and_external_tables";

/// Point of the scan at which hooks run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// Before the list of databases is taken
    ListDatabases,
    /// Before the table names of a database are taken
    ListTables { database: String },
    /// Before the definition of a table is read
    CreateQuery {
        table: QualifiedTableName,
        temporary: bool,
    },
}

type CatalogHook = Box<dyn FnMut(&CatalogEvent, &MemoryCatalog) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct CatalogState {
    databases: BTreeMap<String, Arc<MemoryDatabase>>,
    temporary_tables: BTreeMap<String, Arc<MemoryStorage>>,
}

struct CatalogInner {
    state: Mutex<CatalogState>,
    hooks: Mutex<Vec<CatalogHook>>,
    temporary_database: Arc<MemoryDatabase>,
    database_listings: AtomicUsize,
}

/// Shared handle to an in-memory catalog
#[derive(Clone)]
pub struct MemoryCatalog {
    inner: Arc<CatalogInner>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<CatalogInner>| CatalogInner {
            state: Mutex::new(CatalogState::default()),
            hooks: Mutex::new(Vec::new()),
            temporary_database: Arc::new(MemoryDatabase::new(
                TEMPORARY_DATABASE,
                "Memory",
                weak.clone(),
            )),
            database_listings: AtomicUsize::new(0),
        });
        Self { inner }
    }

    /// Run `hook` at every [`CatalogEvent`]
    pub fn on_event<F>(&self, hook: F)
    where
        F: FnMut(&CatalogEvent, &MemoryCatalog) + Send + 'static,
    {
        lock(&self.inner.hooks).push(Box::new(hook));
    }

    /// Run `action` once, at the first event `matches` accepts
    pub fn on_first<M, F>(&self, matches: M, action: F)
    where
        M: Fn(&CatalogEvent) -> bool + Send + 'static,
        F: FnOnce(&MemoryCatalog) + Send + 'static,
    {
        let mut action = Some(action);
        self.on_event(move |event, catalog| {
            if matches(event) {
                if let Some(action) = action.take() {
                    action(catalog);
                }
            }
        });
    }

    /// How many times the list of databases was taken
    pub fn database_listings(&self) -> usize {
        self.inner.database_listings.load(Ordering::SeqCst)
    }

    fn fire(&self, event: CatalogEvent) {
        let mut hooks = std::mem::take(&mut *lock(&self.inner.hooks));
        for hook in &mut hooks {
            hook(&event, self);
        }
        let mut registered = lock(&self.inner.hooks);
        hooks.append(&mut registered);
        *registered = hooks;
    }

    fn fire_from(inner: &Weak<CatalogInner>, event: CatalogEvent) {
        if let Some(inner) = inner.upgrade() {
            MemoryCatalog { inner }.fire(event);
        }
    }

    pub fn create_database(&self, name: &str) -> BackupResult<Arc<MemoryDatabase>> {
        self.create_database_with_engine(name, "Atomic")
    }

    pub fn create_database_with_engine(
        &self,
        name: &str,
        engine: &str,
    ) -> BackupResult<Arc<MemoryDatabase>> {
        let mut state = lock(&self.inner.state);
        if state.databases.contains_key(name) {
            return Err(BackupError::Catalog(format!("Database {name} already exists")));
        }
        let database = Arc::new(MemoryDatabase::new(
            name,
            engine,
            Arc::downgrade(&self.inner),
        ));
        state.databases.insert(name.to_string(), database.clone());
        Ok(database)
    }

    pub fn create_table(
        &self,
        database: &str,
        table: &str,
        engine: &str,
    ) -> BackupResult<Arc<MemoryStorage>> {
        let state = lock(&self.inner.state);
        let owner = state
            .databases
            .get(database)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: database.to_string(),
            })?;
        let mut tables = lock(&owner.tables);
        if tables.contains_key(table) {
            return Err(BackupError::Catalog(format!(
                "Table {database}.{table} already exists"
            )));
        }
        let storage = Arc::new(MemoryStorage::new(
            QualifiedTableName::new(database, table),
            false,
            engine,
            Arc::downgrade(&self.inner),
        ));
        tables.insert(table.to_string(), storage.clone());
        Ok(storage)
    }

    pub fn create_temporary_table(
        &self,
        table: &str,
        engine: &str,
    ) -> BackupResult<Arc<MemoryStorage>> {
        let mut state = lock(&self.inner.state);
        if state.temporary_tables.contains_key(table) {
            return Err(BackupError::Catalog(format!(
                "Temporary table {table} already exists"
            )));
        }
        let storage = Arc::new(MemoryStorage::new(
            QualifiedTableName::temporary(table),
            true,
            engine,
            Arc::downgrade(&self.inner),
        ));
        state
            .temporary_tables
            .insert(table.to_string(), storage.clone());
        Ok(storage)
    }

    pub fn database(&self, name: &str) -> Option<Arc<MemoryDatabase>> {
        lock(&self.inner.state).databases.get(name).cloned()
    }

    pub fn table(&self, name: &QualifiedTableName) -> Option<Arc<MemoryStorage>> {
        let database = self.database(&name.database)?;
        let table = lock(&database.tables).get(&name.table).cloned();
        table
    }

    /// Move a table to a new name, possibly in another database
    pub fn rename_table(
        &self,
        from: &QualifiedTableName,
        to: &QualifiedTableName,
    ) -> BackupResult<()> {
        let state = lock(&self.inner.state);
        let source = state
            .databases
            .get(&from.database)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: from.database.clone(),
            })?;
        let target = state
            .databases
            .get(&to.database)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: to.database.clone(),
            })?;

        let storage = lock(&source.tables)
            .remove(&from.table)
            .ok_or_else(|| BackupError::UnknownTable {
                table: from.clone(),
                temporary: false,
            })?;
        *lock(&storage.name) = to.clone();
        lock(&target.tables).insert(to.table.clone(), storage);
        debug!(from = %from, to = %to, "Renamed table");
        Ok(())
    }

    /// Rename a database; its tables follow it
    pub fn rename_database(&self, from: &str, to: &str) -> BackupResult<()> {
        let mut state = lock(&self.inner.state);
        if state.databases.contains_key(to) {
            return Err(BackupError::Catalog(format!("Database {to} already exists")));
        }
        let database = state
            .databases
            .remove(from)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: from.to_string(),
            })?;
        *lock(&database.name) = to.to_string();
        for storage in lock(&database.tables).values() {
            lock(&storage.name).database = to.to_string();
        }
        state.databases.insert(to.to_string(), database);
        debug!(from, to, "Renamed database");
        Ok(())
    }

    pub fn drop_table(&self, name: &QualifiedTableName) -> BackupResult<()> {
        let database = self
            .database(&name.database)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: name.database.clone(),
            })?;
        let storage = lock(&database.tables).remove(&name.table).ok_or_else(|| {
            BackupError::UnknownTable {
                table: name.clone(),
                temporary: false,
            }
        })?;
        storage.dropped.store(true, Ordering::SeqCst);
        debug!(table = %name, "Dropped table");
        Ok(())
    }

    pub fn drop_database(&self, name: &str) -> BackupResult<()> {
        let database = lock(&self.inner.state)
            .databases
            .remove(name)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: name.to_string(),
            })?;
        database.dropped.store(true, Ordering::SeqCst);
        for storage in lock(&database.tables).values() {
            storage.dropped.store(true, Ordering::SeqCst);
        }
        debug!(database = name, "Dropped database");
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_database_and_table(
        &self,
        name: &QualifiedTableName,
        temporary: bool,
    ) -> BackupResult<(DatabasePtr, StoragePtr)> {
        if temporary {
            let storage: StoragePtr = lock(&self.inner.state)
                .temporary_tables
                .get(&name.table)
                .cloned()
                .ok_or_else(|| BackupError::UnknownTable {
                    table: name.clone(),
                    temporary: true,
                })?;
            let database: DatabasePtr = self.inner.temporary_database.clone();
            return Ok((database, storage));
        }

        let database = self
            .database(&name.database)
            .ok_or_else(|| BackupError::UnknownDatabase {
                database: name.database.clone(),
            })?;
        let storage: StoragePtr = lock(&database.tables)
            .get(&name.table)
            .cloned()
            .ok_or_else(|| BackupError::UnknownTable {
                table: name.clone(),
                temporary: false,
            })?;
        let database: DatabasePtr = database;
        Ok((database, storage))
    }

    async fn get_database(&self, name: &str) -> BackupResult<DatabasePtr> {
        let database: DatabasePtr =
            self.database(name)
                .ok_or_else(|| BackupError::UnknownDatabase {
                    database: name.to_string(),
                })?;
        Ok(database)
    }

    async fn databases(&self) -> BackupResult<Vec<(String, DatabasePtr)>> {
        self.inner.database_listings.fetch_add(1, Ordering::SeqCst);
        self.fire(CatalogEvent::ListDatabases);
        Ok(lock(&self.inner.state)
            .databases
            .iter()
            .map(|(name, database)| (name.clone(), database.clone() as DatabasePtr))
            .collect())
    }
}

/// A database of a [`MemoryCatalog`]
pub struct MemoryDatabase {
    name: Mutex<String>,
    engine: String,
    tables: Mutex<BTreeMap<String, Arc<MemoryStorage>>>,
    dropped: AtomicBool,
    catalog: Weak<CatalogInner>,
}

impl MemoryDatabase {
    fn new(name: &str, engine: &str, catalog: Weak<CatalogInner>) -> Self {
        Self {
            name: Mutex::new(name.to_string()),
            engine: engine.to_string(),
            tables: Mutex::new(BTreeMap::new()),
            dropped: AtomicBool::new(false),
            catalog,
        }
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    fn ensure_not_dropped(&self) -> BackupResult<()> {
        if self.is_dropped() {
            return Err(BackupError::DatabaseIsDropped {
                database: self.name(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_database_query_for_backup(&self) -> BackupResult<CreateQuery> {
        self.ensure_not_dropped()?;
        Ok(CreateQuery::database(self.name(), &self.engine))
    }

    async fn tables_for_backup(&self) -> BackupResult<Vec<String>> {
        MemoryCatalog::fire_from(
            &self.catalog,
            CatalogEvent::ListTables {
                database: self.name(),
            },
        );
        self.ensure_not_dropped()?;
        Ok(lock(&self.tables).keys().cloned().collect())
    }
}

/// A table of a [`MemoryCatalog`].
///
/// Rows are JSON values grouped by partition. Engines whose name ends with
/// `MergeTree` back up one entry per partition and accept partition filters;
/// every other engine backs up a single entry and refuses them.
pub struct MemoryStorage {
    name: Mutex<QualifiedTableName>,
    temporary: bool,
    engine: String,
    columns: Mutex<Option<String>>,
    rows: Mutex<BTreeMap<Partition, Vec<serde_json::Value>>>,
    with_checksums: AtomicBool,
    dropped: AtomicBool,
    share_lock: Arc<RwLock<()>>,
    catalog: Weak<CatalogInner>,
}

impl MemoryStorage {
    fn new(
        name: QualifiedTableName,
        temporary: bool,
        engine: &str,
        catalog: Weak<CatalogInner>,
    ) -> Self {
        Self {
            name: Mutex::new(name),
            temporary,
            engine: engine.to_string(),
            columns: Mutex::new(None),
            rows: Mutex::new(BTreeMap::new()),
            with_checksums: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
            share_lock: Arc::new(RwLock::new(())),
            catalog,
        }
    }

    pub fn set_columns(&self, columns: &str) {
        *lock(&self.columns) = Some(columns.to_string());
    }

    /// Add a row to a partition; other engines should use partition `""`
    pub fn insert(&self, partition: &str, row: serde_json::Value) {
        lock(&self.rows)
            .entry(partition.to_string())
            .or_default()
            .push(row);
    }

    /// Queue a post-collection task writing a checksum file after the data
    pub fn enable_checksums(&self) {
        self.with_checksums.store(true, Ordering::SeqCst);
    }

    pub fn supports_partitions(&self) -> bool {
        self.engine.ends_with("MergeTree")
    }

    /// Whether some backup currently holds a share lock on this table
    pub fn is_locked_for_share(&self) -> bool {
        self.share_lock.try_write().is_err()
    }

    /// Hold the table exclusively, as an `ALTER` would
    pub async fn lock_exclusive(&self) -> tokio::sync::OwnedRwLockWriteGuard<()> {
        self.share_lock.clone().write_owned().await
    }

    fn ensure_not_dropped(&self) -> BackupResult<()> {
        if self.dropped.load(Ordering::SeqCst) {
            return Err(BackupError::TableIsDropped {
                table: self.storage_id(),
            });
        }
        Ok(())
    }

    fn encode_rows(rows: &[serde_json::Value]) -> BackupResult<Vec<u8>> {
        let mut data = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut data, row)
                .map_err(|e| BackupError::Catalog(format!("Failed to encode row: {e}")))?;
            data.push(b'\n');
        }
        Ok(data)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn storage_id(&self) -> QualifiedTableName {
        lock(&self.name).clone()
    }

    fn engine_name(&self) -> String {
        self.engine.clone()
    }

    async fn lock_for_share(
        &self,
        query_id: &str,
        timeout: Duration,
    ) -> BackupResult<TableLockHolder> {
        self.ensure_not_dropped()?;
        let guard = tokio::time::timeout(timeout, self.share_lock.clone().read_owned())
            .await
            .map_err(|_| BackupError::LockTimeout {
                table: self.storage_id(),
                timeout,
            })?;
        debug!(table = %self.storage_id(), query_id, "Locked table for share");
        Ok(TableLockHolder::new(guard))
    }

    async fn create_query_for_backup(&self) -> BackupResult<CreateQuery> {
        MemoryCatalog::fire_from(
            &self.catalog,
            CatalogEvent::CreateQuery {
                table: self.storage_id(),
                temporary: self.temporary,
            },
        );
        self.ensure_not_dropped()?;

        let name = self.storage_id();
        let query = if self.temporary {
            CreateQuery::temporary_table(name.table, &self.engine)
        } else {
            CreateQuery::table(name.database, name.table, &self.engine)
        };
        Ok(match lock(&self.columns).as_deref() {
            Some(columns) => query.with_columns(columns),
            None => query,
        })
    }

    async fn backup_data(
        &self,
        sink: &mut dyn BackupEntrySink,
        data_path_in_backup: &str,
        partitions: Option<&[Partition]>,
    ) -> BackupResult<()> {
        if partitions.is_some() && !self.supports_partitions() {
            return Err(BackupError::partitions_not_supported(
                self.storage_id(),
                self.engine_name(),
            ));
        }

        let mut entries = BackupEntries::new();
        {
            let rows = lock(&self.rows);
            if self.supports_partitions() {
                for (partition, partition_rows) in rows.iter() {
                    if partitions.is_some_and(|selected| !selected.contains(partition)) {
                        continue;
                    }
                    entries.push(BackupEntry::from_memory(
                        format!(
                            "{data_path_in_backup}{}/data.jsonl",
                            escape_for_file_name(partition)
                        ),
                        Self::encode_rows(partition_rows)?,
                    ));
                }
            } else {
                let all_rows: Vec<serde_json::Value> =
                    rows.values().flatten().cloned().collect();
                entries.push(BackupEntry::from_memory(
                    format!("{data_path_in_backup}data.jsonl"),
                    Self::encode_rows(&all_rows)?,
                ));
            }
        }

        let written: Vec<String> = entries.iter().map(|entry| entry.path.clone()).collect();
        sink.add_backup_entries(entries)?;

        if self.with_checksums.load(Ordering::SeqCst) {
            let checksums_path = format!("{data_path_in_backup}checksums.txt");
            sink.add_post_collecting_task(Box::new(move |sink| {
                let mut listing = written.join("\n");
                listing.push('\n');
                sink.add_backup_entry(BackupEntry::from_memory(checksums_path, listing))
            }))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rename_keeps_the_object() {
        let catalog = MemoryCatalog::new();
        catalog.create_database("db").unwrap();
        let storage = catalog.create_table("db", "t", "Memory").unwrap();

        catalog
            .rename_table(
                &QualifiedTableName::new("db", "t"),
                &QualifiedTableName::new("db", "u"),
            )
            .unwrap();

        let (_, found) = catalog
            .get_database_and_table(&QualifiedTableName::new("db", "u"), false)
            .await
            .unwrap();
        let expected: StoragePtr = storage;
        assert!(tablesnap_core::same_object(&found, &expected));
        assert_eq!(found.storage_id(), QualifiedTableName::new("db", "u"));
        assert!(
            catalog
                .try_get_database_and_table(&QualifiedTableName::new("db", "t"), false)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_dropped_table_refuses_definition() {
        let catalog = MemoryCatalog::new();
        catalog.create_database("db").unwrap();
        let storage = catalog.create_table("db", "t", "Memory").unwrap();
        catalog
            .drop_table(&QualifiedTableName::new("db", "t"))
            .unwrap();

        let err = storage.create_query_for_backup().await.unwrap_err();
        assert!(err.is_concurrently_dropped());
    }

    #[tokio::test]
    async fn test_hooks_run_at_events() {
        let catalog = MemoryCatalog::new();
        catalog.create_database("db").unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        catalog.on_event(move |event, _| {
            if matches!(event, CatalogEvent::ListTables { database } if database == "db") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        catalog.on_first(
            |event| matches!(event, CatalogEvent::ListDatabases),
            |catalog| {
                catalog.create_database("late").unwrap();
            },
        );

        let databases = catalog.databases().await.unwrap();
        assert_eq!(databases.len(), 2);
        assert_eq!(catalog.databases().await.unwrap().len(), 2);
        assert_eq!(catalog.database_listings(), 2);

        let database = catalog.get_database("db").await.unwrap();
        database.tables_for_backup().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_share_lock_times_out_under_exclusive_lock() {
        let catalog = MemoryCatalog::new();
        catalog.create_database("db").unwrap();
        let storage = catalog.create_table("db", "t", "Memory").unwrap();

        let exclusive = storage.lock_exclusive().await;
        let err = storage
            .lock_for_share("q", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::LockTimeout { .. }));
        drop(exclusive);

        let holder = storage
            .lock_for_share("q", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(storage.is_locked_for_share());
        drop(holder);
        assert!(!storage.is_locked_for_share());
    }
}
