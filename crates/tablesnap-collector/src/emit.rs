//! Turning a [`CatalogSnapshot`] into backup entries

use tablesnap_core::{BackupEntry, BackupEntrySink, BackupResult, RenamingMap};
use tracing::trace;

use crate::paths;
use crate::scan::CatalogSnapshot;

/// Writes definitions and table data of a snapshot into a sink
pub struct EntryEmitter<'a> {
    snapshot: &'a CatalogSnapshot,
    renaming_map: &'a RenamingMap,
    root_path_in_backup: &'a str,
}

impl<'a> EntryEmitter<'a> {
    pub fn new(
        snapshot: &'a CatalogSnapshot,
        renaming_map: &'a RenamingMap,
        root_path_in_backup: &'a str,
    ) -> Self {
        Self {
            snapshot,
            renaming_map,
            root_path_in_backup,
        }
    }

    /// One `.sql` entry per database, carrying its renamed definition
    pub fn add_database_definitions(&self, sink: &mut dyn BackupEntrySink) -> BackupResult<()> {
        for (database_name, info) in &self.snapshot.database_infos {
            let new_database_name = self.renaming_map.new_database_name(database_name);
            let path = paths::database_metadata_path(self.root_path_in_backup, &new_database_name);
            let definition = info.create_database_query.rename(self.renaming_map).to_sql();
            trace!(%path, database = %database_name, "Adding definition of database");
            sink.add_backup_entry(BackupEntry::from_memory(path, definition))?;
        }
        Ok(())
    }

    /// One `.sql` entry per table, carrying its renamed definition
    pub fn add_table_definitions(&self, sink: &mut dyn BackupEntrySink) -> BackupResult<()> {
        for (table_key, info) in &self.snapshot.table_infos {
            let path =
                paths::table_metadata_path(self.root_path_in_backup, table_key, self.renaming_map);
            let definition = info.create_table_query.rename(self.renaming_map).to_sql();
            trace!(%path, table = %table_key, "Adding definition of table");
            sink.add_backup_entry(BackupEntry::from_memory(path, definition))?;
        }
        Ok(())
    }

    /// Ask every table's storage to add its data entries
    pub async fn add_table_data(&self, sink: &mut dyn BackupEntrySink) -> BackupResult<()> {
        for (table_key, info) in &self.snapshot.table_infos {
            trace!(
                path = %info.data_path_in_backup,
                table = %table_key,
                partitions = info.partitions.as_ref().map_or(0, Vec::len),
                "Collecting data of table"
            );
            info.storage
                .backup_data(sink, &info.data_path_in_backup, info.partitions.as_deref())
                .await?;
        }
        Ok(())
    }
}
