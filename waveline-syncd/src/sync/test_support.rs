use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use waveline_core::{UploadDescriptor, WavelineError};

use super::local_watcher::{FilesystemWatcher, WatchFailure};
use super::remote::RemoteSyncService;
use crate::progress::ProgressSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanCall {
    pub files: Vec<String>,
    pub roots: Vec<String>,
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadCall {
    pub name: String,
    pub file: String,
    pub dir: String,
    pub separator: String,
    pub roots: Vec<String>,
    pub bytes: Vec<u8>,
}

/// Holds one upload open until the test releases it.
pub(crate) struct Gate {
    name: String,
    pub started: Notify,
    pub release: Notify,
}

pub(crate) struct FakeRemote {
    plan: Option<Vec<String>>,
    plan_calls: Mutex<Vec<PlanCall>>,
    uploads: Mutex<Vec<UploadCall>>,
    failing_uploads: HashSet<String>,
    gate: Option<Gate>,
}

impl FakeRemote {
    pub fn planning(files: Vec<String>) -> Self {
        Self {
            plan: Some(files),
            plan_calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            failing_uploads: HashSet::new(),
            gate: None,
        }
    }

    pub fn failing_plan() -> Self {
        Self {
            plan: None,
            ..Self::planning(Vec::new())
        }
    }

    pub fn with_failing_upload(mut self, name: &str) -> Self {
        self.failing_uploads.insert(name.to_string());
        self
    }

    pub fn with_gate(mut self, name: &str) -> Self {
        self.gate = Some(Gate {
            name: name.to_string(),
            started: Notify::new(),
            release: Notify::new(),
        });
        self
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("remote built without a gate")
    }

    pub fn plan_calls(&self) -> Vec<PlanCall> {
        self.plan_calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads().into_iter().map(|call| call.name).collect()
    }
}

#[async_trait]
impl RemoteSyncService for FakeRemote {
    async fn plan_sync(
        &self,
        files: &[String],
        roots: &[String],
        separator: &str,
    ) -> Result<Vec<String>, WavelineError> {
        self.plan_calls.lock().unwrap().push(PlanCall {
            files: files.to_vec(),
            roots: roots.to_vec(),
            separator: separator.to_string(),
        });
        self.plan
            .clone()
            .ok_or_else(|| WavelineError::Io(std::io::Error::other("connection refused")))
    }

    async fn upload_file(&self, mut descriptor: UploadDescriptor) -> Result<(), WavelineError> {
        let mut bytes = Vec::new();
        descriptor.data.read_to_end(&mut bytes).await?;
        self.uploads.lock().unwrap().push(UploadCall {
            name: descriptor.name.clone(),
            file: descriptor.file,
            dir: descriptor.dir,
            separator: descriptor.separator,
            roots: descriptor.roots,
            bytes,
        });
        if let Some(gate) = self.gate.as_ref()
            && gate.name == descriptor.name
        {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if self.failing_uploads.contains(&descriptor.name) {
            return Err(WavelineError::Io(std::io::Error::other("upload rejected")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Progress(usize, usize),
    Idle,
    Error(String),
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, index: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(index, total));
    }

    fn on_idle(&self) {
        self.events.lock().unwrap().push(SinkEvent::Idle);
    }

    fn on_error(&self, context: &str, _error: &dyn std::error::Error) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Error(context.to_string()));
    }
}

#[derive(Debug, Default)]
pub(crate) struct WatcherLog {
    pub watched: Vec<PathBuf>,
    pub unwatched: Vec<PathBuf>,
    pub detached: usize,
    pub failing: HashSet<PathBuf>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeWatcher {
    log: Arc<Mutex<WatcherLog>>,
}

impl FakeWatcher {
    pub fn failing(root: &Path) -> Self {
        let watcher = Self::default();
        watcher.log().failing.insert(root.to_path_buf());
        watcher
    }

    pub fn log(&self) -> MutexGuard<'_, WatcherLog> {
        self.log.lock().unwrap()
    }
}

impl FilesystemWatcher for FakeWatcher {
    fn watch_roots(&mut self, roots: &[PathBuf]) -> Vec<WatchFailure> {
        let mut log = self.log();
        let mut failures = Vec::new();
        for root in roots {
            if log.failing.contains(root) {
                failures.push(WatchFailure::new(root, "permission denied"));
            } else {
                log.watched.push(root.clone());
            }
        }
        failures
    }

    fn unwatch_roots(&mut self, roots: &[PathBuf]) {
        self.log().unwatched.extend(roots.iter().cloned());
    }

    fn detach(&mut self) {
        self.log().detached += 1;
    }
}
