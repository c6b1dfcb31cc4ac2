//! Schema definitions as stored in a backup
//!
//! A [`CreateQuery`] is the definition a database or table reports "for
//! backup". Its own identity fields are what the scanner cross-checks against
//! the name it looked the object up by; a mismatch means the object was renamed
//! mid-scan.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::identifiers::QualifiedTableName;
use crate::renaming::RenamingMap;

/// Definition of a database (`table == None`) or of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuery {
    pub database: String,
    pub table: Option<String>,
    pub temporary: bool,
    pub engine: String,
    /// Column list as written in the definition, without parentheses
    #[serde(default)]
    pub columns: Option<String>,
    /// Table this one is defined against (`CREATE TABLE t AS db.src`)
    #[serde(default)]
    pub as_table: Option<QualifiedTableName>,
}

impl CreateQuery {
    pub fn database(name: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            database: name.into(),
            table: None,
            temporary: false,
            engine: engine.into(),
            columns: None,
            as_table: None,
        }
    }

    pub fn table(
        database: impl Into<String>,
        table: impl Into<String>,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: Some(table.into()),
            temporary: false,
            engine: engine.into(),
            columns: None,
            as_table: None,
        }
    }

    pub fn temporary_table(table: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            temporary: true,
            ..Self::table(String::new(), table, engine)
        }
    }

    pub fn with_columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn with_as_table(mut self, source: QualifiedTableName) -> Self {
        self.as_table = Some(source);
        self
    }

    pub fn is_database(&self) -> bool {
        self.table.is_none()
    }

    /// Database name embedded in the definition
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Table name embedded in the definition, empty for databases
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or_default()
    }

    /// Rewrite the definition's own name and nested table references
    pub fn rename(&self, renaming: &RenamingMap) -> CreateQuery {
        let mut renamed = self.clone();
        match &self.table {
            None => renamed.database = renaming.new_database_name(&self.database),
            Some(table) if self.temporary => {
                renamed.table = Some(renaming.new_temporary_table_name(table));
            }
            Some(table) => {
                let new_name =
                    renaming.new_table_name(&QualifiedTableName::new(&self.database, table));
                renamed.database = new_name.database;
                renamed.table = Some(new_name.table);
            }
        }
        renamed.as_table = self
            .as_table
            .as_ref()
            .map(|source| renaming.new_table_name(source));
        renamed
    }

    /// Render the definition as SQL text
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        match &self.table {
            None => {
                let _ = write!(sql, "CREATE DATABASE {}", back_quote_if_need(&self.database));
            }
            Some(table) => {
                sql.push_str(if self.temporary {
                    "CREATE TEMPORARY TABLE "
                } else {
                    "CREATE TABLE "
                });
                if !self.temporary && !self.database.is_empty() {
                    let _ = write!(sql, "{}.", back_quote_if_need(&self.database));
                }
                sql.push_str(&back_quote_if_need(table));
                if let Some(source) = &self.as_table {
                    let _ = write!(sql, " AS {}", quote_qualified(source));
                }
                if let Some(columns) = &self.columns {
                    let _ = write!(sql, " ({columns})");
                }
            }
        }
        let _ = write!(sql, " ENGINE = {}", self.engine);
        sql
    }
}

fn quote_qualified(name: &QualifiedTableName) -> String {
    if name.database.is_empty() {
        back_quote_if_need(&name.table)
    } else {
        format!(
            "{}.{}",
            back_quote_if_need(&name.database),
            back_quote_if_need(&name.table)
        )
    }
}

/// Quote an identifier with backticks unless it is a plain word
pub fn back_quote_if_need(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if plain {
        return name.to_string();
    }
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for c in name.chars() {
        if c == '`' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('`');
    quoted
}
