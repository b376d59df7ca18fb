use std::fmt;

use tokio::sync::watch;
use tracing::{info, warn};

/// Receives sync progress for display. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    /// Called after each upload attempt, `index` is 1-based.
    fn on_progress(&self, index: usize, total: usize);

    /// Called once the upload queue is empty again.
    fn on_idle(&self);

    fn on_error(&self, context: &str, error: &dyn std::error::Error);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Ready,
    Syncing { index: usize, total: usize },
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("✓ Ready to sync"),
            Self::Syncing { index, total } => write!(f, "⟳ Syncing file {index}/{total}"),
        }
    }
}

/// Logs status changes and publishes the latest status for a UI to follow.
pub struct LogProgressSink {
    status: watch::Sender<SyncStatus>,
}

impl LogProgressSink {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SyncStatus::Ready);
        Self { status }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }
}

impl Default for LogProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogProgressSink {
    fn on_progress(&self, index: usize, total: usize) {
        let status = SyncStatus::Syncing { index, total };
        info!(index, total, "{status}");
        self.status.send_replace(status);
    }

    fn on_idle(&self) {
        let status = SyncStatus::Ready;
        info!("{status}");
        self.status.send_replace(status);
    }

    fn on_error(&self, context: &str, error: &dyn std::error::Error) {
        warn!(context, error = %error, "sync error");
    }
}
