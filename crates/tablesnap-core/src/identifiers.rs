//! Table and database identities
//!
//! Names here are plain strings taken from the catalog: any byte sequence is a
//! valid database or table name, so unlike the validated identifiers elsewhere
//! these types never reject input. Path safety is handled separately by
//! [`crate::escape`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A database-qualified table name.
///
/// Temporary tables live outside any database and use an empty `database`.
///
/// Ordering is lexicographic by database, then by table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedTableName {
    pub database: String,
    pub table: String,
}

impl QualifiedTableName {
    /// Create a qualified name
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Create the name of a temporary table (no database)
    pub fn temporary(table: impl Into<String>) -> Self {
        Self::new(String::new(), table)
    }

    /// Full name as `database.table`, or just `table` without a database
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QualifiedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.database.is_empty() {
            write!(f, "{}", self.table)
        } else {
            write!(f, "{}.{}", self.database, self.table)
        }
    }
}

/// Identity of a table inside one backup: its name plus the temporary flag.
///
/// Used for deduplication within a scan pass and for comparing consecutive
/// passes. Orders by name first, then non-temporary before temporary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub name: QualifiedTableName,
    pub is_temporary: bool,
}

impl TableKey {
    pub fn new(name: QualifiedTableName, is_temporary: bool) -> Self {
        Self { name, is_temporary }
    }

    /// Key of an ordinary table
    pub fn table(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(QualifiedTableName::new(database, table), false)
    }

    /// Key of a temporary table
    pub fn temporary(table: impl Into<String>) -> Self {
        Self::new(QualifiedTableName::temporary(table), true)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_temporary {
            write!(f, "temporary table {}", self.name)
        } else {
            write!(f, "table {}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(QualifiedTableName::new("db", "t").to_string(), "db.t");
        assert_eq!(QualifiedTableName::temporary("tmp").to_string(), "tmp");
        assert_eq!(TableKey::temporary("tmp").to_string(), "temporary table tmp");
    }

    #[test]
    fn test_table_key_orders_by_name_then_temporary_flag() {
        let a = TableKey::table("a", "z");
        let b = TableKey::table("b", "a");
        assert!(a < b);

        let plain = TableKey::new(QualifiedTableName::new("", "x"), false);
        let temp = TableKey::temporary("x");
        assert!(plain < temp);
        assert_ne!(plain, temp);
    }
}
