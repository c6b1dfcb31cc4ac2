//! Name translation from the live catalog into the backup
//!
//! A [`RenamingMap`] is built once from the backup query and is read-only
//! afterwards. Table lookups prefer an explicit table mapping, then fall back
//! to the mapping of the table's database with the table name kept, then to
//! the original name.

use std::collections::BTreeMap;

use crate::error::{BackupError, BackupResult};
use crate::identifiers::QualifiedTableName;
use crate::query::BackupQueryElement;

/// Translation table from original names to names inside the backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenamingMap {
    databases: BTreeMap<String, String>,
    tables: BTreeMap<QualifiedTableName, QualifiedTableName>,
    temporary_tables: BTreeMap<String, String>,
}

impl RenamingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from the renaming directives of a backup query.
    ///
    /// Elements without a new name map to themselves, so a later element that
    /// renames the same object to something else is reported as a conflict.
    pub fn from_backup_query(elements: &[BackupQueryElement]) -> BackupResult<Self> {
        let mut map = Self::new();
        for element in elements {
            match element {
                BackupQueryElement::Table { name, new_name, .. } => {
                    let new_name = new_name.clone().unwrap_or_else(|| name.clone());
                    map.set_new_table_name(name.clone(), new_name)?;
                }
                BackupQueryElement::TemporaryTable { name, new_name, .. } => {
                    let new_name = new_name.clone().unwrap_or_else(|| name.clone());
                    map.set_new_temporary_table_name(name.clone(), new_name)?;
                }
                BackupQueryElement::Database { name, new_name, .. } => {
                    let new_name = new_name.clone().unwrap_or_else(|| name.clone());
                    map.set_new_database_name(name.clone(), new_name)?;
                }
                BackupQueryElement::All { .. } => {}
            }
        }
        Ok(map)
    }

    pub fn set_new_database_name(
        &mut self,
        old_name: String,
        new_name: String,
    ) -> BackupResult<()> {
        if let Some(previous) = self.databases.get(&old_name) {
            if *previous != new_name {
                return Err(BackupError::WrongRenaming {
                    source_name: format!("database {old_name}"),
                    target: new_name,
                    previous: previous.clone(),
                });
            }
            return Ok(());
        }
        self.databases.insert(old_name, new_name);
        Ok(())
    }

    pub fn set_new_table_name(
        &mut self,
        old_name: QualifiedTableName,
        new_name: QualifiedTableName,
    ) -> BackupResult<()> {
        if let Some(previous) = self.tables.get(&old_name) {
            if *previous != new_name {
                return Err(BackupError::WrongRenaming {
                    source_name: format!("table {old_name}"),
                    target: new_name.to_string(),
                    previous: previous.to_string(),
                });
            }
            return Ok(());
        }
        self.tables.insert(old_name, new_name);
        Ok(())
    }

    pub fn set_new_temporary_table_name(
        &mut self,
        old_name: String,
        new_name: String,
    ) -> BackupResult<()> {
        if let Some(previous) = self.temporary_tables.get(&old_name) {
            if *previous != new_name {
                return Err(BackupError::WrongRenaming {
                    source_name: format!("temporary table {old_name}"),
                    target: new_name,
                    previous: previous.clone(),
                });
            }
            return Ok(());
        }
        self.temporary_tables.insert(old_name, new_name);
        Ok(())
    }

    pub fn new_database_name(&self, old_name: &str) -> String {
        self.databases
            .get(old_name)
            .cloned()
            .unwrap_or_else(|| old_name.to_string())
    }

    pub fn new_table_name(&self, old_name: &QualifiedTableName) -> QualifiedTableName {
        if let Some(new_name) = self.tables.get(old_name) {
            return new_name.clone();
        }
        QualifiedTableName::new(self.new_database_name(&old_name.database), &old_name.table)
    }

    pub fn new_temporary_table_name(&self, old_name: &str) -> String {
        self.temporary_tables
            .get(old_name)
            .cloned()
            .unwrap_or_else(|| old_name.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.tables.is_empty() && self.temporary_tables.is_empty()
    }
}
