//! Error types for backup collection
//!
//! Every failure that can abort a backup pipeline is a [`BackupError`]. Races
//! observed while scanning the catalog (a table renamed or dropped under the
//! scan) are not errors; they only force another scan pass. The exceptions are
//! [`BackupError::TableIsDropped`] and [`BackupError::DatabaseIsDropped`],
//! which collaborators raise to tell the scanner that an object vanished and
//! which the scanner swallows on best-effort lookups.

use std::time::Duration;

use thiserror::Error;

use crate::identifiers::QualifiedTableName;
use crate::stage::Stage;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur while collecting backup entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    /// The catalog did not stabilize before the scan deadline
    #[error(
        "Couldn't collect tables and databases to make a backup (pass #{pass}, elapsed {})",
        humanize(*elapsed)
    )]
    CannotCollectObjects { pass: usize, elapsed: Duration },

    /// A table named explicitly in the backup query does not exist
    #[error("{} {table} doesn't exist", if *temporary { "Temporary table" } else { "Table" })]
    UnknownTable {
        table: QualifiedTableName,
        temporary: bool,
    },

    /// A database named explicitly in the backup query does not exist
    #[error("Database {database} doesn't exist")]
    UnknownDatabase { database: String },

    /// The table was dropped while it was being read
    #[error("Table {table} is dropped")]
    TableIsDropped { table: QualifiedTableName },

    /// The database was dropped while it was being read
    #[error("Database {database} is dropped")]
    DatabaseIsDropped { database: String },

    /// A table engine cannot honor a partition filter
    #[error("Table engine {engine} doesn't support partitions, cannot backup table {table}")]
    PartitionsNotSupported {
        engine: String,
        table: QualifiedTableName,
    },

    /// The renaming directives of the query contradict each other
    #[error("Cannot rename {source_name} to {target}, because it's already renamed to {previous}")]
    WrongRenaming {
        source_name: String,
        target: String,
        previous: String,
    },

    /// A shared lock on a table could not be acquired in time
    #[error("Locking table {table} for share timed out after {timeout:?}")]
    LockTimeout {
        table: QualifiedTableName,
        timeout: Duration,
    },

    /// Not every participating host reached a stage before the barrier deadline
    #[error(
        "Stage '{stage}' timed out after {timeout:?}, hosts not ready: [{}]",
        missing_hosts.join(", ")
    )]
    StageTimeout {
        stage: Stage,
        timeout: Duration,
        missing_hosts: Vec<String>,
    },

    /// Another host participating in the backup reported a failure
    #[error("Error on host {host_id}: {message}")]
    PeerFailed { host_id: String, message: String },

    /// The collector was used in a way correct callers never do
    #[error("Logical error: {0}")]
    LogicalError(String),

    /// Catalog or storage failure not covered by a more specific variant
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Coordination service failure
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// Settings or configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Standard failure for a storage asked to filter by partitions it cannot handle
    pub fn partitions_not_supported(
        table: QualifiedTableName,
        engine: impl Into<String>,
    ) -> Self {
        BackupError::PartitionsNotSupported {
            engine: engine.into(),
            table,
        }
    }

    /// Shorthand for [`BackupError::LogicalError`]
    pub fn logical(message: impl Into<String>) -> Self {
        BackupError::LogicalError(message.into())
    }

    /// Whether this error means the object disappeared while it was being read.
    ///
    /// Best-effort lookups during a scan treat such errors as "not found".
    pub fn is_concurrently_dropped(&self) -> bool {
        matches!(
            self,
            BackupError::TableIsDropped { .. }
                | BackupError::DatabaseIsDropped { .. }
                | BackupError::UnknownTable { .. }
                | BackupError::UnknownDatabase { .. }
        )
    }

    /// Whether this error is a programming error rather than a data error
    pub fn is_logical(&self) -> bool {
        matches!(self, BackupError::LogicalError(_))
    }
}

fn humanize(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_not_supported_message() {
        let err = BackupError::partitions_not_supported(
            QualifiedTableName::new("db", "events"),
            "Memory",
        );
        assert_eq!(
            err.to_string(),
            "Table engine Memory doesn't support partitions, cannot backup table db.events"
        );
    }

    #[test]
    fn test_convergence_failure_reports_pass_and_elapsed() {
        let err = BackupError::CannotCollectObjects {
            pass: 7,
            elapsed: Duration::from_millis(1500),
        };
        let message = err.to_string();
        assert!(message.contains("pass #7"));
        assert!(message.contains("1.500s"));
    }

    #[test]
    fn test_dropped_classification() {
        let dropped = BackupError::TableIsDropped {
            table: QualifiedTableName::new("db", "t"),
        };
        assert!(dropped.is_concurrently_dropped());
        assert!(!BackupError::logical("oops").is_concurrently_dropped());
        assert!(BackupError::logical("oops").is_logical());
    }

    #[test]
    fn test_unknown_temporary_table_message() {
        let err = BackupError::UnknownTable {
            table: QualifiedTableName::temporary("scratch"),
            temporary: true,
        };
        assert_eq!(err.to_string(), "Temporary table scratch doesn't exist");
    }
}
