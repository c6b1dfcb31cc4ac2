//! Elements of a backup query
//!
//! A backup query is a list of [`BackupQueryElement`]s. Each element names one
//! table, one temporary table, one database, or every database, optionally with
//! a new name to use inside the backup, partition filters, and exceptions.
//!
//! # Example
//!
//! ```rust
//! use tablesnap_core::BackupQueryElement;
//!
//! let elements = vec![
//!     BackupQueryElement::database("db1").except_table("db1", "t2"),
//!     BackupQueryElement::table("db2", "events")
//!         .with_partitions(["2024-01", "2024-02"])
//!         .renamed_to("archive", "events_2024"),
//! ];
//! assert_eq!(elements.len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identifiers::QualifiedTableName;

/// Partition selector passed through to the storage engine as-is
pub type Partition = String;

/// One element of a backup query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackupQueryElement {
    /// A single table
    Table {
        name: QualifiedTableName,
        new_name: Option<QualifiedTableName>,
        partitions: Option<Vec<Partition>>,
    },
    /// A single temporary table
    TemporaryTable {
        name: String,
        new_name: Option<String>,
        partitions: Option<Vec<Partition>>,
    },
    /// A whole database, except some of its tables
    Database {
        name: String,
        new_name: Option<String>,
        except_tables: BTreeSet<QualifiedTableName>,
    },
    /// All databases, except some databases and some tables
    All {
        except_databases: BTreeSet<String>,
        except_tables: BTreeSet<QualifiedTableName>,
    },
}

impl BackupQueryElement {
    pub fn table(database: impl Into<String>, table: impl Into<String>) -> Self {
        BackupQueryElement::Table {
            name: QualifiedTableName::new(database, table),
            new_name: None,
            partitions: None,
        }
    }

    pub fn temporary_table(table: impl Into<String>) -> Self {
        BackupQueryElement::TemporaryTable {
            name: table.into(),
            new_name: None,
            partitions: None,
        }
    }

    pub fn database(database: impl Into<String>) -> Self {
        BackupQueryElement::Database {
            name: database.into(),
            new_name: None,
            except_tables: BTreeSet::new(),
        }
    }

    pub fn all() -> Self {
        BackupQueryElement::All {
            except_databases: BTreeSet::new(),
            except_tables: BTreeSet::new(),
        }
    }

    /// Restrict a table element to the given partitions.
    ///
    /// No effect on database and "all" elements.
    pub fn with_partitions<I, P>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Partition>,
    {
        if let BackupQueryElement::Table { partitions, .. }
        | BackupQueryElement::TemporaryTable { partitions, .. } = &mut self
        {
            partitions
                .get_or_insert_with(Vec::new)
                .extend(selectors.into_iter().map(Into::into));
        }
        self
    }

    /// Store a table under a different name in the backup.
    ///
    /// For temporary tables only `table` is used. No effect on other elements.
    pub fn renamed_to(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        match &mut self {
            BackupQueryElement::Table { new_name, .. } => {
                *new_name = Some(QualifiedTableName::new(database, table));
            }
            BackupQueryElement::TemporaryTable { new_name, .. } => {
                *new_name = Some(table.into());
            }
            _ => {}
        }
        self
    }

    /// Store a database under a different name in the backup.
    ///
    /// No effect on elements other than [`BackupQueryElement::Database`].
    pub fn database_renamed_to(mut self, database: impl Into<String>) -> Self {
        if let BackupQueryElement::Database { new_name, .. } = &mut self {
            *new_name = Some(database.into());
        }
        self
    }

    /// Exclude a table from a database or "all" element
    pub fn except_table(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        if let BackupQueryElement::Database { except_tables, .. }
        | BackupQueryElement::All { except_tables, .. } = &mut self
        {
            except_tables.insert(QualifiedTableName::new(database, table));
        }
        self
    }

    /// Exclude a database from an "all" element
    pub fn except_database(mut self, database: impl Into<String>) -> Self {
        if let BackupQueryElement::All {
            except_databases, ..
        } = &mut self
        {
            except_databases.insert(database.into());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_only_apply_to_tables() {
        let table = BackupQueryElement::table("db", "t").with_partitions(["p1"]).with_partitions(["p2"]);
        match table {
            BackupQueryElement::Table { partitions, .. } => {
                assert_eq!(partitions, Some(vec!["p1".to_string(), "p2".to_string()]));
            }
            other => panic!("unexpected element {other:?}"),
        }

        let db = BackupQueryElement::database("db").with_partitions(["p1"]);
        assert_eq!(db, BackupQueryElement::database("db"));
    }

    #[test]
    fn test_exceptions() {
        let all = BackupQueryElement::all()
            .except_database("system")
            .except_table("db", "secret");
        match all {
            BackupQueryElement::All {
                except_databases,
                except_tables,
            } => {
                assert!(except_databases.contains("system"));
                assert!(except_tables.contains(&QualifiedTableName::new("db", "secret")));
            }
            other => panic!("unexpected element {other:?}"),
        }
    }
}
