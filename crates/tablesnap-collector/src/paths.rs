//! Layout of a backup
//!
//! ```text
//! {root}metadata/{db}.sql
//! {root}metadata/{db}/{table}.sql
//! {root}temporary_tables/metadata/{table}.sql
//! {root}data/{db}/{table}/
//! {root}temporary_tables/data/{table}/
//! ```
//!
//! `{root}` is empty for a single-host backup and `shards/{s}/replicas/{r}/`
//! for one host of a clustered backup. Names are the renamed ones, escaped
//! with [`escape_for_file_name`].

use tablesnap_core::{
    BackupResult, BackupSettings, RenamingMap, TableKey, escape_for_file_name,
};

/// Root of everything this host writes
pub fn root_path_in_backup(shard_num: usize, replica_num: usize) -> String {
    format!("shards/{shard_num}/replicas/{replica_num}/")
}

/// Root for the host described by `settings`
pub fn root_path_for_settings(settings: &BackupSettings) -> BackupResult<String> {
    Ok(settings
        .shard_and_replica()?
        .map(|(shard_num, replica_num)| root_path_in_backup(shard_num, replica_num))
        .unwrap_or_default())
}

pub fn database_metadata_path(root: &str, new_database_name: &str) -> String {
    format!("{root}metadata/{}.sql", escape_for_file_name(new_database_name))
}

pub fn table_metadata_path(root: &str, table_key: &TableKey, renaming_map: &RenamingMap) -> String {
    if table_key.is_temporary {
        let new_name = renaming_map.new_temporary_table_name(&table_key.name.table);
        format!(
            "{root}temporary_tables/metadata/{}.sql",
            escape_for_file_name(&new_name)
        )
    } else {
        let new_name = renaming_map.new_table_name(&table_key.name);
        format!(
            "{root}metadata/{}/{}.sql",
            escape_for_file_name(&new_name.database),
            escape_for_file_name(&new_name.table)
        )
    }
}

pub fn table_data_path(root: &str, table_key: &TableKey, renaming_map: &RenamingMap) -> String {
    if table_key.is_temporary {
        let new_name = renaming_map.new_temporary_table_name(&table_key.name.table);
        format!(
            "{root}temporary_tables/data/{}/",
            escape_for_file_name(&new_name)
        )
    } else {
        let new_name = renaming_map.new_table_name(&table_key.name);
        format!(
            "{root}data/{}/{}/",
            escape_for_file_name(&new_name.database),
            escape_for_file_name(&new_name.table)
        )
    }
}
