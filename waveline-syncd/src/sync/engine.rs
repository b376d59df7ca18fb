use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::debounce::DebounceBatcher;
use super::local_watcher::{FileEvent, FileEventKind};
use super::pipeline::UploadPipeline;
use super::reconcile::{ReconcileError, SyncReconciler};
use super::registry::WatchRegistry;
use crate::progress::ProgressSink;

/// Everything the engine loop reacts to.
#[derive(Debug)]
pub enum SyncMessage {
    File(FileEvent),
    /// The batcher's quiet window may have elapsed.
    TimerFired,
    AddRoots {
        roots: Vec<PathBuf>,
        reply: Option<oneshot::Sender<Vec<PathBuf>>>,
    },
    RemoveRoots(Vec<PathBuf>),
    Watch {
        reply: Option<oneshot::Sender<Vec<PathBuf>>>,
    },
    Unwatch,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Batching,
    Syncing,
}

/// Result of handling one message.
#[derive(Debug)]
pub enum Step {
    Continue,
    /// A batch was flushed; the handle resolves once it was reconciled and,
    /// if this call owned the drain, uploaded.
    Flushed(JoinHandle<()>),
    Stop,
}

pub struct SyncEngine {
    registry: WatchRegistry,
    batcher: DebounceBatcher,
    reconciler: Arc<SyncReconciler>,
    pipeline: Arc<UploadPipeline>,
    sink: Arc<dyn ProgressSink>,
}

impl SyncEngine {
    pub fn new(
        registry: WatchRegistry,
        batcher: DebounceBatcher,
        reconciler: SyncReconciler,
        pipeline: UploadPipeline,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            registry,
            batcher,
            reconciler: Arc::new(reconciler),
            pipeline: Arc::new(pipeline),
            sink,
        }
    }

    pub fn state(&self) -> SyncState {
        if self.pipeline.is_syncing() {
            SyncState::Syncing
        } else if self.batcher.is_batching() {
            SyncState::Batching
        } else {
            SyncState::Idle
        }
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn batcher(&self) -> &DebounceBatcher {
        &self.batcher
    }

    pub fn pipeline(&self) -> &Arc<UploadPipeline> {
        &self.pipeline
    }

    pub fn watch(&mut self) -> Vec<PathBuf> {
        self.registry.watch()
    }

    pub fn unwatch(&mut self) {
        self.registry.unwatch();
    }

    /// Applies one message. Deterministic apart from the spawned sync task.
    pub fn handle(&mut self, message: SyncMessage) -> Step {
        match message {
            SyncMessage::File(event) => {
                self.on_file_event(event);
                Step::Continue
            }
            SyncMessage::TimerFired => match self.batcher.poll_flush(Instant::now()) {
                Some(batch) => Step::Flushed(self.spawn_sync(batch)),
                None => Step::Continue,
            },
            SyncMessage::AddRoots { roots, reply } => {
                let added = self.registry.add_roots(roots);
                if let Some(reply) = reply {
                    let _ = reply.send(added);
                }
                Step::Continue
            }
            SyncMessage::RemoveRoots(roots) => {
                self.registry.remove_roots(&roots);
                Step::Continue
            }
            SyncMessage::Watch { reply } => {
                let roots = self.registry.watch();
                if let Some(reply) = reply {
                    let _ = reply.send(roots);
                }
                Step::Continue
            }
            SyncMessage::Unwatch => {
                self.registry.unwatch();
                Step::Continue
            }
            SyncMessage::Shutdown => Step::Stop,
        }
    }

    /// Consumes messages until shutdown or until every sender is gone, then
    /// waits for batches already flushed to finish uploading.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncMessage>) {
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        loop {
            let deadline = self.batcher.deadline();
            let message = match deadline {
                Some(deadline) => tokio::select! {
                    message = rx.recv() => message,
                    _ = tokio::time::sleep_until(deadline) => Some(SyncMessage::TimerFired),
                },
                None => rx.recv().await,
            };
            let Some(message) = message else {
                break;
            };
            match self.handle(message) {
                Step::Continue => {}
                Step::Flushed(handle) => {
                    in_flight.retain(|task| !task.is_finished());
                    in_flight.push(handle);
                }
                Step::Stop => break,
            }
        }
        self.registry.unwatch();

        in_flight.retain(|task| !task.is_finished());
        if !in_flight.is_empty() {
            info!(batches = in_flight.len(), "waiting for in-flight uploads");
        }
        for task in in_flight {
            if let Err(err) = task.await {
                warn!(error = %err, "sync task ended abnormally");
            }
        }
        info!("sync engine stopped");
    }

    fn on_file_event(&mut self, event: FileEvent) {
        match event.kind {
            FileEventKind::Created => {
                if self.batcher.observe(&event, Instant::now()) {
                    debug!(
                        path = %event.path.display(),
                        pending = self.batcher.pending().len(),
                        "file queued for sync"
                    );
                }
            }
            FileEventKind::Removed => {
                debug!(path = %event.path.display(), "file removed");
            }
        }
    }

    fn spawn_sync(&self, batch: Vec<PathBuf>) -> JoinHandle<()> {
        info!(files = batch.len(), "batch ready");
        let roots = self.registry.root_strings();
        let reconciler = Arc::clone(&self.reconciler);
        let pipeline = Arc::clone(&self.pipeline);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match reconciler.reconcile(&batch, &roots).await {
                Ok(files) if files.is_empty() => {
                    debug!("server already has every file in the batch");
                }
                Ok(files) => {
                    pipeline.enqueue_and_drain(files, roots).await;
                }
                Err(err) => {
                    let ReconcileError::Remote(remote) = &err;
                    warn!(
                        files = batch.len(),
                        class = ?remote.classification(),
                        "sync planning failed, batch dropped"
                    );
                    sink.on_error("sync", &err);
                    if !pipeline.is_syncing() {
                        sink.on_idle();
                    }
                }
            }
        })
    }
}
