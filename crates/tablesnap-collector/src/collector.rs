//! The backup entries pipeline of one host

use std::sync::Arc;

use tablesnap_core::{
    BackupCoordination, BackupEntries, BackupEntry, BackupEntrySink, BackupError,
    BackupQueryElement, BackupResult, BackupSettings, Catalog, PostCollectingTask, RenamingMap,
    Stage, TableKey,
};
use tracing::{info, trace, warn};

use crate::config::CollectorConfig;
use crate::emit::EntryEmitter;
use crate::paths;
use crate::scan::{CatalogScanner, CatalogSnapshot, DatabaseInfo, ScanOptions, ScanStats, TableInfo};
use crate::sink::EntryCollection;
use crate::sync::StageSynchronizer;

/// Collects the entries one host contributes to a backup.
///
/// [`BackupEntriesCollector::get_backup_entries`] runs the whole pipeline:
///
/// 1. **Finding tables**: scan the catalog until it is consistent, then add
///    the definitions of the databases and tables found
/// 2. **Extracting data from tables**: let every storage add its data
/// 3. **Running post tasks**: drain the tasks queued by the storages
/// 4. **Writing backup**: seal the entry list and return it
///
/// Every stage starts with a barrier across the participating hosts. Any
/// failure moves the host to [`Stage::Error`], reports the failure to the
/// other hosts and is returned to the caller.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tablesnap_collector::{BackupEntriesCollector, CollectorConfig, LocalBackupCoordination};
/// use tablesnap_core::{BackupQueryElement, BackupSettings, Catalog};
///
/// async fn backup(catalog: Arc<dyn Catalog>) -> tablesnap_core::BackupResult<()> {
///     let mut collector = BackupEntriesCollector::new(
///         vec![BackupQueryElement::database("db1").except_table("db1", "t2")],
///         BackupSettings::default(),
///         Arc::new(LocalBackupCoordination::new()),
///         catalog,
///         CollectorConfig::default(),
///     );
///     let entries = collector.get_backup_entries().await?;
///     println!("{} entries", entries.len());
///     Ok(())
/// }
/// ```
pub struct BackupEntriesCollector {
    elements: Vec<BackupQueryElement>,
    settings: BackupSettings,
    catalog: Arc<dyn Catalog>,
    config: CollectorConfig,
    synchronizer: StageSynchronizer,
    root_path_in_backup: String,
    renaming_map: RenamingMap,
    snapshot: CatalogSnapshot,
    scan_stats: Option<ScanStats>,
    collection: EntryCollection,
}

impl BackupEntriesCollector {
    pub fn new(
        elements: Vec<BackupQueryElement>,
        settings: BackupSettings,
        coordination: Arc<dyn BackupCoordination>,
        catalog: Arc<dyn Catalog>,
        config: CollectorConfig,
    ) -> Self {
        let synchronizer = StageSynchronizer::new(
            coordination,
            settings.host_id.clone(),
            settings.participating_hosts(),
            config.stage_timeout,
        );
        Self {
            elements,
            settings,
            catalog,
            config,
            synchronizer,
            root_path_in_backup: String::new(),
            renaming_map: RenamingMap::new(),
            snapshot: CatalogSnapshot::default(),
            scan_stats: None,
            collection: EntryCollection::new(),
        }
    }

    /// Run the pipeline and return every collected entry.
    ///
    /// Can be called once per collector.
    ///
    /// # Errors
    ///
    /// Any error of the pipeline. No partial result is returned.
    pub async fn get_backup_entries(&mut self) -> BackupResult<BackupEntries> {
        if self.synchronizer.current_stage() != Stage::Preparing {
            return Err(BackupError::logical("Already making backup entries"));
        }

        info!(
            host_id = %self.settings.host_id,
            elements = self.elements.len(),
            structure_only = self.settings.structure_only,
            "Collecting backup entries"
        );

        match self.run_stages().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                if let Err(report_error) = self.synchronizer.fail(&e.to_string()).await {
                    warn!(error = %report_error, "Failed to report the backup error to other hosts");
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> BackupResult<BackupEntries> {
        self.root_path_in_backup = paths::root_path_for_settings(&self.settings)?;
        trace!(root_path = %self.root_path_in_backup, "Resolved root path in backup");
        self.renaming_map = RenamingMap::from_backup_query(&self.elements)?;

        self.synchronizer.advance(Stage::FindingTables).await?;
        let mut scanner = CatalogScanner::new(
            self.catalog.as_ref(),
            &self.elements,
            &self.renaming_map,
            ScanOptions {
                root_path_in_backup: self.root_path_in_backup.clone(),
                query_id: self.config.query_id.clone(),
                lock_acquire_timeout: self.config.lock_acquire_timeout,
                consistency_timeout: self.config.consistency_timeout,
            },
        );
        let (snapshot, scan_stats) = scanner.scan().await?;
        self.snapshot = snapshot;
        self.scan_stats = Some(scan_stats);

        let emitter = EntryEmitter::new(
            &self.snapshot,
            &self.renaming_map,
            &self.root_path_in_backup,
        );
        emitter.add_database_definitions(&mut self.collection)?;
        emitter.add_table_definitions(&mut self.collection)?;

        self.synchronizer
            .advance(Stage::ExtractingDataFromTables)
            .await?;
        if !self.settings.structure_only {
            emitter.add_table_data(&mut self.collection).await?;
        }

        self.synchronizer.advance(Stage::RunningPostTasks).await?;
        self.collection.run_post_collecting_tasks()?;

        self.collection.seal();
        self.synchronizer.advance(Stage::WritingBackup).await?;

        info!(
            entries = self.collection.entries().len(),
            passes = scan_stats.passes,
            "Collected backup entries"
        );
        Ok(self.collection.entries().to_vec())
    }

    pub fn current_stage(&self) -> Stage {
        self.synchronizer.current_stage()
    }

    /// Statistics of the catalog scan, once it converged
    pub fn scan_stats(&self) -> Option<ScanStats> {
        self.scan_stats
    }

    pub fn table_infos(&self) -> impl Iterator<Item = (&TableKey, &TableInfo)> {
        self.snapshot.table_infos.iter()
    }

    pub fn database_infos(&self) -> impl Iterator<Item = (&String, &DatabaseInfo)> {
        self.snapshot.database_infos.iter()
    }

    /// Entries collected so far
    pub fn backup_entries(&self) -> &[BackupEntry] {
        self.collection.entries()
    }

    pub fn root_path_in_backup(&self) -> &str {
        &self.root_path_in_backup
    }
}

impl BackupEntrySink for BackupEntriesCollector {
    fn add_backup_entry(&mut self, entry: BackupEntry) -> BackupResult<()> {
        self.collection.add_backup_entry(entry)
    }

    fn add_backup_entries(&mut self, entries: BackupEntries) -> BackupResult<()> {
        self.collection.add_backup_entries(entries)
    }

    fn add_post_collecting_task(&mut self, task: PostCollectingTask) -> BackupResult<()> {
        self.collection.add_post_collecting_task(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::LocalBackupCoordination;
    use async_trait::async_trait;
    use std::time::Duration;
    use tablesnap_core::{CreateQuery, Database, DatabasePtr, QualifiedTableName, StoragePtr};

    struct EmptyCatalog;

    #[async_trait]
    impl Catalog for EmptyCatalog {
        async fn get_database_and_table(
            &self,
            name: &QualifiedTableName,
            temporary: bool,
        ) -> BackupResult<(DatabasePtr, StoragePtr)> {
            Err(BackupError::UnknownTable {
                table: name.clone(),
                temporary,
            })
        }

        async fn get_database(&self, name: &str) -> BackupResult<DatabasePtr> {
            Err(BackupError::UnknownDatabase {
                database: name.to_string(),
            })
        }

        async fn databases(&self) -> BackupResult<Vec<(String, DatabasePtr)>> {
            Ok(Vec::new())
        }
    }

    struct SingleDatabase;

    #[async_trait]
    impl Database for SingleDatabase {
        async fn create_database_query_for_backup(&self) -> BackupResult<CreateQuery> {
            Ok(CreateQuery::database("db", "Atomic"))
        }

        async fn tables_for_backup(&self) -> BackupResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct OneDatabaseCatalog(DatabasePtr);

    #[async_trait]
    impl Catalog for OneDatabaseCatalog {
        async fn get_database_and_table(
            &self,
            name: &QualifiedTableName,
            temporary: bool,
        ) -> BackupResult<(DatabasePtr, StoragePtr)> {
            Err(BackupError::UnknownTable {
                table: name.clone(),
                temporary,
            })
        }

        async fn get_database(&self, name: &str) -> BackupResult<DatabasePtr> {
            if name == "db" {
                Ok(self.0.clone())
            } else {
                Err(BackupError::UnknownDatabase {
                    database: name.to_string(),
                })
            }
        }

        async fn databases(&self) -> BackupResult<Vec<(String, DatabasePtr)>> {
            Ok(vec![("db".to_string(), self.0.clone())])
        }
    }

    fn collector(
        elements: Vec<BackupQueryElement>,
        catalog: Arc<dyn Catalog>,
        coordination: Arc<LocalBackupCoordination>,
    ) -> BackupEntriesCollector {
        BackupEntriesCollector::new(
            elements,
            BackupSettings::default(),
            coordination,
            catalog,
            CollectorConfig::default().with_timeout(Some(Duration::from_secs(5))),
        )
    }

    #[tokio::test]
    async fn test_empty_query_reaches_writing_backup() {
        let coordination = Arc::new(LocalBackupCoordination::new());
        let mut collector = collector(Vec::new(), Arc::new(EmptyCatalog), coordination.clone());

        let entries = collector.get_backup_entries().await.unwrap();
        assert!(entries.is_empty());
        assert_eq!(collector.current_stage(), Stage::WritingBackup);
        assert_eq!(collector.scan_stats().unwrap().passes, 2);
        assert_eq!(coordination.reached_stages().await.len(), 4);
    }

    #[tokio::test]
    async fn test_database_definition_is_collected() {
        let coordination = Arc::new(LocalBackupCoordination::new());
        let catalog = Arc::new(OneDatabaseCatalog(Arc::new(SingleDatabase)));
        let mut collector = collector(
            vec![BackupQueryElement::database("db").database_renamed_to("restored")],
            catalog,
            coordination,
        );

        let entries = collector.get_backup_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "metadata/restored.sql");
        assert_eq!(
            entries[0].content.read_all().unwrap(),
            b"CREATE DATABASE restored ENGINE = Atomic".to_vec()
        );
        assert_eq!(collector.database_infos().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_required_table_reports_error() {
        let coordination = Arc::new(LocalBackupCoordination::new());
        let mut collector = collector(
            vec![BackupQueryElement::table("db", "nope")],
            Arc::new(EmptyCatalog),
            coordination.clone(),
        );

        let err = collector.get_backup_entries().await.unwrap_err();
        assert!(matches!(err, BackupError::UnknownTable { .. }));
        assert_eq!(collector.current_stage(), Stage::Error);
        assert_eq!(coordination.last_error().await, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_second_invocation_is_rejected() {
        let coordination = Arc::new(LocalBackupCoordination::new());
        let mut collector = collector(Vec::new(), Arc::new(EmptyCatalog), coordination.clone());

        collector.get_backup_entries().await.unwrap();
        let err = collector.get_backup_entries().await.unwrap_err();
        assert!(err.is_logical());
        assert_eq!(collector.current_stage(), Stage::WritingBackup);
        assert_eq!(coordination.last_error().await, None);
    }

    #[tokio::test]
    async fn test_adding_after_seal_fails() {
        let coordination = Arc::new(LocalBackupCoordination::new());
        let mut collector = collector(Vec::new(), Arc::new(EmptyCatalog), coordination);

        collector
            .add_backup_entry(BackupEntry::from_memory("extra.txt", "x"))
            .unwrap();
        collector.get_backup_entries().await.unwrap();

        let err = collector
            .add_backup_entry(BackupEntry::from_memory("late.txt", "y"))
            .unwrap_err();
        assert!(err.is_logical());
        assert_eq!(collector.backup_entries().len(), 1);
        assert_eq!(collector.backup_entries()[0].path, "extra.txt");
    }
}
