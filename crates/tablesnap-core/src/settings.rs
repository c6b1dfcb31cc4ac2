//! Backup settings consumed by the collector
//!
//! Settings describe where this host sits in the cluster and what kind of
//! backup is being made. They are loaded from TOML or built in code:
//!
//! ```rust
//! use tablesnap_core::BackupSettings;
//!
//! let settings = BackupSettings::from_toml_str(r#"
//!     host_id = "host-b"
//!     cluster_host_ids = [["host-a", "host-b"], ["host-c", "host-d"]]
//!     structure_only = true
//! "#).unwrap();
//!
//! assert_eq!(settings.shard_and_replica().unwrap(), Some((1, 2)));
//! assert!(settings.structure_only);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BackupError, BackupResult};

/// Settings of one backup as seen by one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Identifier of this host, empty for a non-clustered backup
    pub host_id: String,
    /// Host identifiers of the cluster, one list of replicas per shard
    pub cluster_host_ids: Vec<Vec<String>>,
    /// Only this shard takes part in the backup (1-based, 0 means all shards)
    pub shard_num: usize,
    /// Only this replica takes part in the backup (1-based, 0 means all replicas)
    pub replica_num: usize,
    /// Store definitions only, without table data
    pub structure_only: bool,
}

impl BackupSettings {
    /// Parse settings from a TOML document
    pub fn from_toml_str(content: &str) -> BackupResult<Self> {
        toml::from_str(content)
            .map_err(|e| BackupError::Config(format!("Failed to parse backup settings: {e}")))
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> BackupResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BackupError::Config(format!(
                "Failed to read backup settings from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            host_id = %settings.host_id,
            structure_only = settings.structure_only,
            "Loaded backup settings"
        );
        Ok(settings)
    }

    /// The 1-based shard and replica numbers of this host, or `None` when the
    /// backup is not clustered
    pub fn shard_and_replica(&self) -> BackupResult<Option<(usize, usize)>> {
        if self.host_id.is_empty() {
            return Ok(None);
        }
        find_shard_num_and_replica_num(&self.cluster_host_ids, &self.host_id).map(Some)
    }

    /// Hosts that take part in the stage barriers of this backup
    pub fn participating_hosts(&self) -> Vec<String> {
        filter_host_ids(&self.cluster_host_ids, self.shard_num, self.replica_num)
    }
}

/// Position of `host_id` in the cluster table as 1-based `(shard, replica)`
pub fn find_shard_num_and_replica_num(
    cluster_host_ids: &[Vec<String>],
    host_id: &str,
) -> BackupResult<(usize, usize)> {
    for (shard_index, replicas) in cluster_host_ids.iter().enumerate() {
        if let Some(replica_index) = replicas.iter().position(|id| id == host_id) {
            return Ok((shard_index + 1, replica_index + 1));
        }
    }
    Err(BackupError::logical(format!(
        "Cannot determine the shard number or the replica number, the current host ({host_id}) is not found in the cluster's hosts"
    )))
}

/// Hosts of the selected shard and replica; 0 selects every shard or replica
pub fn filter_host_ids(
    cluster_host_ids: &[Vec<String>],
    only_shard_num: usize,
    only_replica_num: usize,
) -> Vec<String> {
    cluster_host_ids
        .iter()
        .enumerate()
        .filter(|(shard_index, _)| only_shard_num == 0 || shard_index + 1 == only_shard_num)
        .flat_map(|(_, replicas)| {
            replicas
                .iter()
                .enumerate()
                .filter(move |(replica_index, _)| {
                    only_replica_num == 0 || replica_index + 1 == only_replica_num
                })
                .map(|(_, host_id)| host_id.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Vec<Vec<String>> {
        vec![
            vec!["a1".to_string(), "a2".to_string()],
            vec!["b1".to_string(), "b2".to_string()],
        ]
    }

    #[test]
    fn test_find_shard_and_replica() {
        assert_eq!(find_shard_num_and_replica_num(&cluster(), "a1").unwrap(), (1, 1));
        assert_eq!(find_shard_num_and_replica_num(&cluster(), "b2").unwrap(), (2, 2));
        let err = find_shard_num_and_replica_num(&cluster(), "zz").unwrap_err();
        assert!(err.is_logical());
    }

    #[test]
    fn test_filter_host_ids() {
        assert_eq!(filter_host_ids(&cluster(), 0, 0), vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(filter_host_ids(&cluster(), 2, 0), vec!["b1", "b2"]);
        assert_eq!(filter_host_ids(&cluster(), 0, 1), vec!["a1", "b1"]);
        assert_eq!(filter_host_ids(&cluster(), 1, 2), vec!["a2"]);
        assert!(filter_host_ids(&cluster(), 3, 0).is_empty());
    }

    #[test]
    fn test_non_clustered_has_no_position() {
        let settings = BackupSettings::default();
        assert_eq!(settings.shard_and_replica().unwrap(), None);
        assert!(settings.participating_hosts().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.toml");
        std::fs::write(&path, "host_id = \"a2\"\ncluster_host_ids = [[\"a1\", \"a2\"]]\n").unwrap();

        let settings = BackupSettings::from_file(&path).unwrap();
        assert_eq!(settings.host_id, "a2");
        assert_eq!(settings.shard_and_replica().unwrap(), Some((1, 2)));
        assert!(!settings.structure_only);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BackupSettings::from_toml_str("structure_only = \"maybe\"").unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }
}
