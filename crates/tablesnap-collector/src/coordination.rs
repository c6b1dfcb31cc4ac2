//! Coordination for a backup made by a single host

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;

use tablesnap_core::{BackupCoordination, BackupResult, Stage};
use tracing::debug;

/// Coordination with nobody to wait for.
///
/// Barriers return immediately. The reached stages and the last reported
/// error are kept for inspection.
#[derive(Debug, Default)]
pub struct LocalBackupCoordination {
    stages: Mutex<Vec<Stage>>,
    last_error: Mutex<Option<String>>,
}

impl LocalBackupCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reached_stages(&self) -> Vec<Stage> {
        self.stages.lock().await.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }
}

#[async_trait]
impl BackupCoordination for LocalBackupCoordination {
    async fn sync_stage(
        &self,
        host_id: &str,
        stage: Stage,
        _all_hosts: &[String],
        _timeout: Option<Duration>,
    ) -> BackupResult<()> {
        debug!(host_id, %stage, "Stage reached");
        self.stages.lock().await.push(stage);
        Ok(())
    }

    async fn sync_stage_error(&self, host_id: &str, error_message: &str) -> BackupResult<()> {
        debug!(host_id, error = %error_message, "Error reported");
        *self.last_error.lock().await = Some(error_message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_stages_and_errors() {
        let coordination = LocalBackupCoordination::new();
        tokio_test::block_on(async {
            coordination
                .sync_stage("", Stage::FindingTables, &[], Some(Duration::ZERO))
                .await
                .unwrap();
            coordination.sync_stage_error("", "no space left").await.unwrap();

            assert_eq!(coordination.reached_stages().await, vec![Stage::FindingTables]);
            assert_eq!(coordination.last_error().await.as_deref(), Some("no space left"));
        });
    }
}
