//! Stages of the backup-entry collection pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of the collection pipeline.
///
/// Stages are entered strictly in declaration order. `WritingBackup` and
/// `Error` are terminal; `Error` can be entered from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Preparing,
    FindingTables,
    ExtractingDataFromTables,
    RunningPostTasks,
    WritingBackup,
    Error,
}

impl Stage {
    /// Stable numeric code sent to the coordination service
    pub const fn code(self) -> i32 {
        match self {
            Stage::Preparing => 0,
            Stage::FindingTables => 1,
            Stage::ExtractingDataFromTables => 2,
            Stage::RunningPostTasks => 3,
            Stage::WritingBackup => 4,
            Stage::Error => 5,
        }
    }

    /// Inverse of [`Stage::code`]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Stage::Preparing),
            1 => Some(Stage::FindingTables),
            2 => Some(Stage::ExtractingDataFromTables),
            3 => Some(Stage::RunningPostTasks),
            4 => Some(Stage::WritingBackup),
            5 => Some(Stage::Error),
            _ => None,
        }
    }

    /// Human-readable stage name
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Preparing => "Preparing",
            Stage::FindingTables => "Finding tables",
            Stage::ExtractingDataFromTables => "Extracting data from tables",
            Stage::RunningPostTasks => "Running post tasks",
            Stage::WritingBackup => "Writing backup",
            Stage::Error => "Error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::WritingBackup | Stage::Error)
    }

    /// The stage that follows this one on the success path
    pub const fn next(self) -> Option<Self> {
        match self {
            Stage::Preparing => Some(Stage::FindingTables),
            Stage::FindingTables => Some(Stage::ExtractingDataFromTables),
            Stage::ExtractingDataFromTables => Some(Stage::RunningPostTasks),
            Stage::RunningPostTasks => Some(Stage::WritingBackup),
            Stage::WritingBackup | Stage::Error => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=5 {
            let stage = Stage::from_code(code).unwrap();
            assert_eq!(stage.code(), code);
        }
        assert_eq!(Stage::from_code(6), None);
    }

    #[test]
    fn test_success_path_order() {
        let mut stage = Stage::Preparing;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited.len(), 5);
        assert_eq!(stage, Stage::WritingBackup);
        assert!(stage.is_terminal());
        assert!(Stage::Error.is_terminal());
        assert_eq!(Stage::Error.next(), None);
    }
}
