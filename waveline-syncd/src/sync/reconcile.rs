use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use waveline_core::WavelineError;

use super::remote::RemoteSyncService;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("sync planning failed: {0}")]
    Remote(#[from] WavelineError),
}

/// Turns a local batch into the list of files the server wants uploaded.
pub struct SyncReconciler {
    remote: Arc<dyn RemoteSyncService>,
    separator: String,
}

impl SyncReconciler {
    pub fn new(remote: Arc<dyn RemoteSyncService>) -> Self {
        Self {
            remote,
            separator: std::path::MAIN_SEPARATOR_STR.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// The server decides; no local diffing happens. A failed call loses the
    /// batch for this cycle.
    pub async fn reconcile(
        &self,
        batch: &[PathBuf],
        roots: &[String],
    ) -> Result<Vec<String>, ReconcileError> {
        let files: Vec<String> = batch
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let planned = self
            .remote
            .plan_sync(&files, roots, &self.separator)
            .await?;
        debug!(
            batch = files.len(),
            planned = planned.len(),
            "sync plan received"
        );
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::FakeRemote;

    #[tokio::test]
    async fn sends_raw_paths_roots_and_separator() {
        let remote = Arc::new(FakeRemote::planning(vec!["/music/rock/song.mp3".into()]));
        let reconciler = SyncReconciler::new(remote.clone()).with_separator("/");

        let planned = reconciler
            .reconcile(
                &[
                    PathBuf::from("/music/rock/song.mp3"),
                    PathBuf::from("/music/old.flac"),
                ],
                &["/music".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(planned, vec!["/music/rock/song.mp3".to_string()]);
        let calls = remote.plan_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].files,
            vec!["/music/rock/song.mp3", "/music/old.flac"]
        );
        assert_eq!(calls[0].roots, vec!["/music"]);
        assert_eq!(calls[0].separator, "/");
    }

    #[tokio::test]
    async fn remote_failure_becomes_reconcile_error() {
        let remote = Arc::new(FakeRemote::failing_plan());
        let reconciler = SyncReconciler::new(remote);

        let err = reconciler
            .reconcile(&[PathBuf::from("/music/a.mp3")], &["/music".to_string()])
            .await
            .expect_err("expected failure");
        assert!(matches!(err, ReconcileError::Remote(_)));
    }

    #[tokio::test]
    async fn defaults_to_native_separator() {
        let remote = Arc::new(FakeRemote::planning(Vec::new()));
        let reconciler = SyncReconciler::new(remote.clone());

        reconciler
            .reconcile(&[PathBuf::from("/music/a.mp3")], &["/music".to_string()])
            .await
            .unwrap();
        assert_eq!(remote.plan_calls()[0].separator, std::path::MAIN_SEPARATOR_STR);
    }
}
