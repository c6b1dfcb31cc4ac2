//! Cross-host stage synchronisation seam

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BackupResult;
use crate::stage::Stage;

/// Coordination service shared by all hosts taking part in one backup.
///
/// Implementations provide a barrier per stage: a host reports it reached a
/// stage and waits until every host in `all_hosts` reported the same stage.
#[async_trait]
pub trait BackupCoordination: Send + Sync {
    /// Report that `host_id` reached `stage` and wait for the other hosts.
    ///
    /// `timeout == None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// `StageTimeout` if some hosts did not arrive in time, `PeerFailed` if a
    /// host reported an error instead.
    async fn sync_stage(
        &self,
        host_id: &str,
        stage: Stage,
        all_hosts: &[String],
        timeout: Option<Duration>,
    ) -> BackupResult<()>;

    /// Report that `host_id` failed. Does not wait for anyone.
    async fn sync_stage_error(&self, host_id: &str, error_message: &str) -> BackupResult<()>;
}
