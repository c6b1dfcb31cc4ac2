//! Stage barriers between collectors running in one process

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use tablesnap_core::{BackupCoordination, BackupError, BackupResult, Stage};
use tracing::debug;

#[derive(Debug, Default)]
struct BarrierState {
    reached: BTreeMap<String, Stage>,
    errors: BTreeMap<String, String>,
}

/// Coordination shared by several collectors of one test.
///
/// A host waiting at a stage is released once every host of `all_hosts` has
/// reached that stage or a later one. A host that reported an error releases
/// every waiter with `PeerFailed`.
#[derive(Debug)]
pub struct InProcessCoordination {
    state: Mutex<BarrierState>,
    version: watch::Sender<u64>,
}

impl Default for InProcessCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessCoordination {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Mutex::new(BarrierState::default()),
            version,
        }
    }

    /// Latest stage `host_id` reported
    pub fn stage_of(&self, host_id: &str) -> Option<Stage> {
        self.state().reached.get(host_id).copied()
    }

    /// Error message `host_id` reported
    pub fn error_of(&self, host_id: &str) -> Option<String> {
        self.state().errors.get(host_id).cloned()
    }

    fn state(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    /// `Ok(None)` when every host arrived, `Ok(Some(missing))` otherwise
    fn check(
        &self,
        host_id: &str,
        stage: Stage,
        all_hosts: &[String],
    ) -> BackupResult<Option<Vec<String>>> {
        let state = self.state();
        for host in all_hosts {
            if host == host_id {
                continue;
            }
            if let Some(message) = state.errors.get(host) {
                return Err(BackupError::PeerFailed {
                    host_id: host.clone(),
                    message: message.clone(),
                });
            }
        }

        let missing: Vec<String> = all_hosts
            .iter()
            .filter(|host| {
                state
                    .reached
                    .get(*host)
                    .is_none_or(|reached| reached.code() < stage.code())
            })
            .cloned()
            .collect();
        Ok((!missing.is_empty()).then_some(missing))
    }
}

#[async_trait]
impl BackupCoordination for InProcessCoordination {
    async fn sync_stage(
        &self,
        host_id: &str,
        stage: Stage,
        all_hosts: &[String],
        timeout: Option<Duration>,
    ) -> BackupResult<()> {
        let mut changes = self.version.subscribe();
        self.state().reached.insert(host_id.to_string(), stage);
        self.bump();
        debug!(host_id, %stage, "Host reached stage");

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let Some(missing) = self.check(host_id, stage, all_hosts)? else {
                return Ok(());
            };

            let changed = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, changes.changed())
                    .await
                    .map_err(|_| BackupError::StageTimeout {
                        stage,
                        timeout: timeout.unwrap_or_default(),
                        missing_hosts: missing,
                    })?,
                None => changes.changed().await,
            };
            changed.map_err(|e| BackupError::Coordination(e.to_string()))?;
        }
    }

    async fn sync_stage_error(&self, host_id: &str, error_message: &str) -> BackupResult<()> {
        self.state()
            .errors
            .insert(host_id.to_string(), error_message.to_string());
        self.bump();
        debug!(host_id, error = %error_message, "Host reported error");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hosts() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[tokio::test]
    async fn test_barrier_waits_for_all_hosts() {
        let coordination = Arc::new(InProcessCoordination::new());

        let first = coordination.clone();
        let waiting = tokio::spawn(async move {
            first
                .sync_stage("a", Stage::FindingTables, &hosts(), Some(Duration::from_secs(5)))
                .await
        });
        tokio::task::yield_now().await;
        coordination
            .sync_stage("b", Stage::FindingTables, &hosts(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        waiting.await.unwrap().unwrap();
        assert_eq!(coordination.stage_of("a"), Some(Stage::FindingTables));
    }

    #[tokio::test]
    async fn test_barrier_times_out_with_missing_hosts() {
        let coordination = InProcessCoordination::new();
        let err = coordination
            .sync_stage("a", Stage::FindingTables, &hosts(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackupError::StageTimeout {
                stage: Stage::FindingTables,
                timeout: Duration::from_millis(20),
                missing_hosts: vec!["b".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_peer_error_releases_waiters() {
        let coordination = Arc::new(InProcessCoordination::new());

        let first = coordination.clone();
        let waiting = tokio::spawn(async move {
            first
                .sync_stage("a", Stage::FindingTables, &hosts(), None)
                .await
        });
        tokio::task::yield_now().await;
        coordination.sync_stage_error("b", "disk full").await.unwrap();

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            BackupError::PeerFailed {
                host_id: "b".to_string(),
                message: "disk full".to_string(),
            }
        );
    }
}
