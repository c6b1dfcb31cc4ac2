//! Consistent snapshot of the catalog
//!
//! The catalog keeps changing while it is scanned, so one pass over it can
//! observe a table under its old name and its database under a new one, or
//! miss a table renamed between two lookups. [`CatalogScanner`] repeats full
//! passes until one pass is internally consistent and finds exactly the same
//! database names and table keys as the pass before it. The first pass has
//! nothing to compare with, so at least two passes are always made.
//!
//! Inconsistencies are not errors. They discard the pass (releasing its table
//! locks) and start another one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use tablesnap_core::{
    BackupError, BackupQueryElement, BackupResult, Catalog, CreateQuery, DatabasePtr, Partition,
    QualifiedTableName, RenamingMap, StoragePtr, TableKey, TableLockHolder, same_object,
};
use tracing::{debug, info, warn};

use crate::paths;

/// What the scan knows about one table
pub struct TableInfo {
    pub database: DatabasePtr,
    pub storage: StoragePtr,
    pub table_lock: TableLockHolder,
    pub create_table_query: CreateQuery,
    /// Where the table's data goes inside the backup
    pub data_path_in_backup: String,
    /// Union of the partition filters of all mentions, in first-seen order
    pub partitions: Option<Vec<Partition>>,
}

/// What the scan knows about one database
pub struct DatabaseInfo {
    pub database: DatabasePtr,
    pub create_database_query: CreateQuery,
}

impl fmt::Debug for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableInfo")
            .field("storage_id", &self.storage.storage_id())
            .field("create_table_query", &self.create_table_query)
            .field("data_path_in_backup", &self.data_path_in_backup)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseInfo")
            .field("create_database_query", &self.create_database_query)
            .finish_non_exhaustive()
    }
}

/// Result of a converged scan
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub database_infos: BTreeMap<String, DatabaseInfo>,
    pub table_infos: BTreeMap<TableKey, TableInfo>,
}

impl CatalogSnapshot {
    pub fn database_names(&self) -> BTreeSet<String> {
        self.database_infos.keys().cloned().collect()
    }

    pub fn table_keys(&self) -> BTreeSet<TableKey> {
        self.table_infos.keys().cloned().collect()
    }
}

/// How long the scan took to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Number of passes made, including the accepted one
    pub passes: usize,
    pub elapsed: Duration,
}

/// Inputs of a scan that stay fixed across passes
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root_path_in_backup: String,
    pub query_id: String,
    pub lock_acquire_timeout: Duration,
    /// `None` retries until the catalog converges
    pub consistency_timeout: Option<Duration>,
}

/// Builds a consistent [`CatalogSnapshot`] for a backup query
pub struct CatalogScanner<'a> {
    catalog: &'a dyn Catalog,
    elements: &'a [BackupQueryElement],
    renaming_map: &'a RenamingMap,
    options: ScanOptions,
    previous_database_names: Option<BTreeSet<String>>,
    previous_table_names: Option<BTreeSet<TableKey>>,
}

/// State of the pass in progress
struct ScanPass {
    snapshot: CatalogSnapshot,
    consistent: bool,
}

impl ScanPass {
    fn new() -> Self {
        Self {
            snapshot: CatalogSnapshot::default(),
            consistent: true,
        }
    }

    fn mark_inconsistent(&mut self, reason: impl fmt::Display) {
        if self.consistent {
            debug!(%reason, "Collected information is inconsistent");
        }
        self.consistent = false;
    }
}

impl<'a> CatalogScanner<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        elements: &'a [BackupQueryElement],
        renaming_map: &'a RenamingMap,
        options: ScanOptions,
    ) -> Self {
        Self {
            catalog,
            elements,
            renaming_map,
            options,
            previous_database_names: None,
            previous_table_names: None,
        }
    }

    /// Scan until two consecutive passes agree.
    ///
    /// # Errors
    ///
    /// `CannotCollectObjects` if the consistency deadline passes first, and
    /// any error of a required lookup or of the catalog itself.
    pub async fn scan(&mut self) -> BackupResult<(CatalogSnapshot, ScanStats)> {
        let start_time = Instant::now();
        let mut pass = 1;

        loop {
            let mut current = self.collect_pass().await?;
            self.check_consistency(&mut current);

            let elapsed = start_time.elapsed();
            if current.consistent {
                info!(
                    databases = current.snapshot.database_infos.len(),
                    tables = current.snapshot.table_infos.len(),
                    passes = pass,
                    "Will backup {} databases and {} tables",
                    current.snapshot.database_infos.len(),
                    current.snapshot.table_infos.len()
                );
                return Ok((current.snapshot, ScanStats { passes: pass, elapsed }));
            }

            // Releases the table locks of the rejected pass.
            drop(current);

            if pass >= 3 {
                if let Some(timeout) = self.options.consistency_timeout {
                    if elapsed > timeout {
                        return Err(BackupError::CannotCollectObjects {
                            pass,
                            elapsed,
                        });
                    }
                }
                warn!(
                    pass,
                    elapsed = %humantime::format_duration(elapsed),
                    "Couldn't collect tables and databases to make a backup (pass #{}, elapsed {})",
                    pass,
                    humantime::format_duration(elapsed)
                );
            }
            pass += 1;
        }
    }

    async fn collect_pass(&self) -> BackupResult<ScanPass> {
        let mut pass = ScanPass::new();

        for element in self.elements {
            match element {
                BackupQueryElement::Table {
                    name, partitions, ..
                } => {
                    self.collect_table_info(&mut pass, name, false, partitions.as_deref(), true)
                        .await?;
                }
                BackupQueryElement::TemporaryTable {
                    name, partitions, ..
                } => {
                    let name = QualifiedTableName::temporary(name.as_str());
                    self.collect_table_info(&mut pass, &name, true, partitions.as_deref(), true)
                        .await?;
                }
                BackupQueryElement::Database {
                    name,
                    except_tables,
                    ..
                } => {
                    self.collect_database_info(&mut pass, name, except_tables, true)
                        .await?;
                }
                BackupQueryElement::All {
                    except_databases,
                    except_tables,
                } => {
                    self.collect_all_databases_info(&mut pass, except_databases, except_tables)
                        .await?;
                }
            }
            if !pass.consistent {
                break;
            }
        }

        Ok(pass)
    }

    async fn collect_table_info(
        &self,
        pass: &mut ScanPass,
        table_name: &QualifiedTableName,
        is_temporary: bool,
        partitions: Option<&[Partition]>,
        throw_if_not_found: bool,
    ) -> BackupResult<()> {
        let table_key = TableKey::new(table_name.clone(), is_temporary);

        let found = if throw_if_not_found {
            let (database, storage) = self
                .catalog
                .get_database_and_table(table_name, is_temporary)
                .await?;
            let (table_lock, create_table_query) = self.lock_and_describe(&storage).await?;
            Some((database, storage, table_lock, create_table_query))
        } else {
            match self
                .catalog
                .try_get_database_and_table(table_name, is_temporary)
                .await?
            {
                None => None,
                Some((database, storage)) => match self.lock_and_describe(&storage).await {
                    Ok((table_lock, create_table_query)) => {
                        Some((database, storage, table_lock, create_table_query))
                    }
                    Err(e) if e.is_concurrently_dropped() => None,
                    Err(e) => return Err(e),
                },
            }
        };

        let Some((database, storage, table_lock, create_table_query)) = found else {
            if pass.snapshot.table_infos.contains_key(&table_key)
                || self
                    .previous_table_names
                    .as_ref()
                    .is_some_and(|names| names.contains(&table_key))
            {
                pass.mark_inconsistent(format_args!("{table_key} disappeared"));
            }
            return Ok(());
        };

        let data_path_in_backup = paths::table_data_path(
            &self.options.root_path_in_backup,
            &table_key,
            self.renaming_map,
        );

        if create_table_query.table_name() != table_name.table
            || create_table_query.temporary != is_temporary
            || create_table_query.database_name() != table_name.database
        {
            pass.mark_inconsistent(format_args!("{table_key} was renamed recently"));
            return Ok(());
        }

        if let Some(existing) = pass.snapshot.table_infos.get(&table_key) {
            if !same_object(&existing.database, &database)
                || !same_object(&existing.storage, &storage)
            {
                pass.mark_inconsistent(format_args!("{table_key} was replaced recently"));
                return Ok(());
            }
        }

        let info = pass
            .snapshot
            .table_infos
            .entry(table_key)
            .or_insert_with(|| TableInfo {
                database: database.clone(),
                storage: storage.clone(),
                table_lock: TableLockHolder::none(),
                create_table_query: create_table_query.clone(),
                data_path_in_backup: data_path_in_backup.clone(),
                partitions: None,
            });
        info.database = database;
        info.storage = storage;
        info.table_lock = table_lock;
        info.create_table_query = create_table_query;
        info.data_path_in_backup = data_path_in_backup;

        if let Some(partitions) = partitions {
            let accumulated = info.partitions.get_or_insert_with(Vec::new);
            for partition in partitions {
                if !accumulated.contains(partition) {
                    accumulated.push(partition.clone());
                }
            }
        }

        Ok(())
    }

    /// Share-lock the table, then read its definition through the lock
    async fn lock_and_describe(
        &self,
        storage: &StoragePtr,
    ) -> BackupResult<(TableLockHolder, CreateQuery)> {
        let table_lock = storage
            .lock_for_share(&self.options.query_id, self.options.lock_acquire_timeout)
            .await?;
        let create_table_query = storage.create_query_for_backup().await?;
        Ok((table_lock, create_table_query))
    }

    async fn collect_database_info(
        &self,
        pass: &mut ScanPass,
        database_name: &str,
        except_table_names: &BTreeSet<QualifiedTableName>,
        throw_if_not_found: bool,
    ) -> BackupResult<()> {
        let (database, create_database_query) = if throw_if_not_found {
            let database = self.catalog.get_database(database_name).await?;
            let create_database_query = database.create_database_query_for_backup().await?;
            (database, create_database_query)
        } else {
            let Some(database) = self.catalog.try_get_database(database_name).await? else {
                self.database_disappeared(pass, database_name);
                return Ok(());
            };
            match database.create_database_query_for_backup().await {
                Ok(create_database_query) => (database, create_database_query),
                Err(e) if e.is_concurrently_dropped() => {
                    self.database_disappeared(pass, database_name);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };

        if !create_database_query.is_database()
            || create_database_query.database_name() != database_name
        {
            pass.mark_inconsistent(format_args!(
                "database {database_name} was renamed recently"
            ));
            return Ok(());
        }

        if let Some(existing) = pass.snapshot.database_infos.get(database_name) {
            if !same_object(&existing.database, &database) {
                pass.mark_inconsistent(format_args!(
                    "database {database_name} was replaced recently"
                ));
                return Ok(());
            }
        }

        pass.snapshot.database_infos.insert(
            database_name.to_string(),
            DatabaseInfo {
                database: database.clone(),
                create_database_query,
            },
        );

        let table_names = match database.tables_for_backup().await {
            Ok(names) => names,
            Err(e) if e.is_concurrently_dropped() => {
                pass.mark_inconsistent(format_args!(
                    "database {database_name} was dropped while listing its tables"
                ));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for table in table_names {
            let table_name = QualifiedTableName::new(database_name, table);
            if except_table_names.contains(&table_name) {
                continue;
            }
            self.collect_table_info(pass, &table_name, false, None, false)
                .await?;
            if !pass.consistent {
                return Ok(());
            }
        }

        Ok(())
    }

    fn database_disappeared(&self, pass: &mut ScanPass, database_name: &str) {
        if pass.snapshot.database_infos.contains_key(database_name)
            || self
                .previous_database_names
                .as_ref()
                .is_some_and(|names| names.contains(database_name))
        {
            pass.mark_inconsistent(format_args!("database {database_name} disappeared"));
        }
    }

    async fn collect_all_databases_info(
        &self,
        pass: &mut ScanPass,
        except_database_names: &BTreeSet<String>,
        except_table_names: &BTreeSet<QualifiedTableName>,
    ) -> BackupResult<()> {
        for (database_name, _) in self.catalog.databases().await? {
            if except_database_names.contains(&database_name) {
                continue;
            }
            self.collect_database_info(pass, &database_name, except_table_names, false)
                .await?;
            if !pass.consistent {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Cross-check the pass and compare it with the previous one
    fn check_consistency(&mut self, pass: &mut ScanPass) {
        if !pass.consistent {
            return;
        }

        // A database reached through a table must be the one reached directly.
        let replaced = pass
            .snapshot
            .table_infos
            .iter()
            .find(|(key, table_info)| {
                pass.snapshot
                    .database_infos
                    .get(&key.name.database)
                    .is_some_and(|info| !same_object(&info.database, &table_info.database))
            })
            .map(|(key, _)| key.clone());
        if let Some(key) = replaced {
            pass.mark_inconsistent(format_args!(
                "database {} of {key} was replaced recently",
                key.name.database
            ));
            return;
        }

        let database_names = pass.snapshot.database_names();
        let table_names = pass.snapshot.table_keys();

        let same_as_previous = self.previous_database_names.as_ref() == Some(&database_names)
            && self.previous_table_names.as_ref() == Some(&table_names);

        if !same_as_previous {
            if self.previous_table_names.is_some() {
                pass.mark_inconsistent(
                    "the set of databases or tables changed since the previous pass",
                );
            } else {
                pass.consistent = false;
            }
            self.previous_database_names = Some(database_names);
            self.previous_table_names = Some(table_names);
        }
    }
}
