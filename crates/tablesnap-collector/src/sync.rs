//! Stage machine of one host and its cross-host barriers

use std::sync::Arc;
use std::time::Duration;

use tablesnap_core::{BackupCoordination, BackupError, BackupResult, Stage};
use tracing::{error, trace};

/// Moves one host through the backup stages in order.
///
/// Entering a stage other than [`Stage::Error`] waits on the coordination
/// barrier for every participating host. Entering [`Stage::Error`] only
/// reports the failure.
pub struct StageSynchronizer {
    coordination: Arc<dyn BackupCoordination>,
    host_id: String,
    all_hosts: Vec<String>,
    timeout: Option<Duration>,
    current: Stage,
}

impl StageSynchronizer {
    pub fn new(
        coordination: Arc<dyn BackupCoordination>,
        host_id: impl Into<String>,
        all_hosts: Vec<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            coordination,
            host_id: host_id.into(),
            all_hosts,
            timeout,
            current: Stage::Preparing,
        }
    }

    pub fn current_stage(&self) -> Stage {
        self.current
    }

    /// Enter `next`, which must directly follow the current stage.
    ///
    /// The stage only changes once the barrier released this host.
    ///
    /// # Errors
    ///
    /// `LogicalError` for an out-of-order transition, otherwise whatever the
    /// barrier reports.
    pub async fn advance(&mut self, next: Stage) -> BackupResult<()> {
        if next == Stage::Error || self.current.next() != Some(next) {
            return Err(BackupError::logical(format!(
                "Cannot move from stage '{}' to stage '{next}'",
                self.current
            )));
        }

        trace!(host_id = %self.host_id, stage = %next, "Entering stage");
        self.coordination
            .sync_stage(&self.host_id, next, &self.all_hosts, self.timeout)
            .await?;
        self.current = next;
        Ok(())
    }

    /// Enter [`Stage::Error`] and tell the other hosts why
    pub async fn fail(&mut self, error_message: &str) -> BackupResult<()> {
        if self.current.is_terminal() {
            return Err(BackupError::logical(format!(
                "Cannot report an error in terminal stage '{}'",
                self.current
            )));
        }

        error!(host_id = %self.host_id, stage = %self.current, error = %error_message, "Backup failed");
        self.current = Stage::Error;
        self.coordination
            .sync_stage_error(&self.host_id, error_message)
            .await
    }
}
