use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use waveline_core::{ApiErrorClass, UploadDescriptor, WavelineError};

use super::paths::relativize;
use super::queue::{Admission, QueuedUpload, SyncQueue};
use super::remote::RemoteSyncService;
use crate::progress::ProgressSink;

pub const DEFAULT_UPLOAD_PACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read local file: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    Remote(#[from] WavelineError),
}

impl UploadError {
    pub fn class(&self) -> Option<ApiErrorClass> {
        match self {
            Self::Remote(err) => err.classification(),
            Self::Io(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
}

impl DrainReport {
    /// Every item the loop attempted, in order.
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Nothing to do; state and queue untouched.
    Empty,
    /// Appended to the drain already in progress.
    Merged { queued: usize },
    /// This call ran the drain loop to completion.
    Drained(DrainReport),
}

/// Sequential, paced uploader. At most one drain loop runs at a time;
/// later batches join the running loop.
pub struct UploadPipeline {
    remote: Arc<dyn RemoteSyncService>,
    sink: Arc<dyn ProgressSink>,
    queue: SyncQueue,
    separator: String,
    pace: Duration,
}

impl UploadPipeline {
    pub fn new(remote: Arc<dyn RemoteSyncService>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            remote,
            sink,
            queue: SyncQueue::default(),
            separator: std::path::MAIN_SEPARATOR_STR.to_string(),
            pace: DEFAULT_UPLOAD_PACE,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn is_syncing(&self) -> bool {
        self.queue.is_syncing()
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Queues `files` and, unless a drain is already running, drains the
    /// queue before returning. Never fails; per-item errors are logged.
    pub async fn enqueue_and_drain(&self, files: Vec<String>, roots: Vec<String>) -> EnqueueOutcome {
        if files.is_empty() {
            return EnqueueOutcome::Empty;
        }
        let roots: Arc<[String]> = Arc::from(roots);
        let items = files
            .into_iter()
            .map(|path| QueuedUpload {
                path,
                roots: Arc::clone(&roots),
            })
            .collect();

        match self.queue.admit(items) {
            Admission::Merged { queued } => {
                info!(queued, "merged into running sync");
                EnqueueOutcome::Merged { queued }
            }
            Admission::Started { queued } => {
                info!(queued, "sync started");
                EnqueueOutcome::Drained(self.drain().await)
            }
        }
    }

    async fn drain(&self) -> DrainReport {
        let mut guard = DrainGuard::new(&self.queue, self.sink.as_ref());
        let mut report = DrainReport::default();

        while let Some(item) = self.queue.next() {
            match self.upload(&item).await {
                Ok(()) => {
                    debug!(path = %item.path, "uploaded");
                    report.uploaded.push(item.path);
                }
                Err(err) => {
                    warn!(
                        path = %item.path,
                        error = %err,
                        class = ?err.class(),
                        "upload failed, skipping"
                    );
                    report.failed.push(item.path);
                }
            }
            let (index, total) = self.queue.progress();
            self.sink.on_progress(index, total);
            tokio::time::sleep(self.pace).await;
        }

        guard.disarm();
        info!(
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            "sync finished"
        );
        self.sink.on_idle();
        report
    }

    async fn upload(&self, item: &QueuedUpload) -> Result<(), UploadError> {
        let relative = relativize(&item.path, &item.roots, &self.separator);
        let data = tokio::fs::File::open(&item.path).await?;
        let len = data.metadata().await?.len();
        self.remote
            .upload_file(UploadDescriptor {
                data,
                len,
                name: relative.name,
                file: relative.file,
                dir: relative.dir,
                separator: self.separator.clone(),
                roots: item.roots.to_vec(),
            })
            .await?;
        Ok(())
    }
}

/// Puts the queue and the status display back to idle if the drain loop
/// exits abnormally.
struct DrainGuard<'a> {
    queue: &'a SyncQueue,
    sink: &'a dyn ProgressSink,
    armed: bool,
}

impl<'a> DrainGuard<'a> {
    fn new(queue: &'a SyncQueue, sink: &'a dyn ProgressSink) -> Self {
        Self {
            queue,
            sink,
            armed: true,
        }
    }

    /// The loop reached an empty queue; `next()` already went idle.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            error!(
                dropped = self.queue.len(),
                "sync loop ended unexpectedly, resetting queue"
            );
            self.queue.reset();
            self.sink.on_idle();
        }
    }
}
