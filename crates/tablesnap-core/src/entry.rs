//! Backup entries: files to be written into the backup

use std::fmt;
use std::sync::Arc;

use crate::error::BackupResult;

/// Provider of the content of one backup file
pub trait BackupEntryContent: Send + Sync + fmt::Debug {
    /// Size of the content in bytes
    fn size(&self) -> u64;

    /// Read the whole content
    fn read_all(&self) -> BackupResult<Vec<u8>>;
}

/// Shared handle to a content provider
pub type BackupEntryContentPtr = Arc<dyn BackupEntryContent>;

/// Content held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntryFromMemory {
    data: Vec<u8>,
}

impl BackupEntryFromMemory {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BackupEntryContent for BackupEntryFromMemory {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_all(&self) -> BackupResult<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// A file to place in the backup: its path inside the backup and its content
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub path: String,
    pub content: BackupEntryContentPtr,
}

impl BackupEntry {
    pub fn new(path: impl Into<String>, content: BackupEntryContentPtr) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }

    /// Entry whose content is held in memory
    pub fn from_memory(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(path, Arc::new(BackupEntryFromMemory::new(data)))
    }
}

/// All entries collected by one pipeline run
pub type BackupEntries = Vec<BackupEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_entry() {
        let entry = BackupEntry::from_memory("metadata/db.sql", "CREATE DATABASE db ENGINE = Atomic");
        assert_eq!(entry.path, "metadata/db.sql");
        assert_eq!(entry.content.size(), 34);
        assert_eq!(
            entry.content.read_all().unwrap(),
            b"CREATE DATABASE db ENGINE = Atomic".to_vec()
        );
    }
}
