use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::engine::SyncMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Removed,
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot watch {}: {reason}", root.display())]
pub struct WatchFailure {
    pub root: PathBuf,
    pub reason: String,
}

impl WatchFailure {
    pub fn new(root: &Path, reason: impl ToString) -> Self {
        Self {
            root: root.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Source of `FileEvent`s for a set of directory roots.
pub trait FilesystemWatcher: Send {
    /// Starts observing `roots`. Roots that cannot be observed are returned;
    /// the others stay watched.
    fn watch_roots(&mut self, roots: &[PathBuf]) -> Vec<WatchFailure>;

    fn unwatch_roots(&mut self, roots: &[PathBuf]);

    /// Drops every listener. A later `watch_roots` starts from scratch.
    fn detach(&mut self);
}

/// `notify`-backed watcher forwarding events into the engine channel.
pub struct NotifyWatcher {
    tx: mpsc::UnboundedSender<SyncMessage>,
    inner: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new(tx: mpsc::UnboundedSender<SyncMessage>) -> Self {
        Self { tx, inner: None }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    fn attach(&mut self) -> notify::Result<&mut RecommendedWatcher> {
        let watcher = match self.inner.take() {
            Some(watcher) => watcher,
            None => {
                let tx = self.tx.clone();
                notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        for local in map_event(event) {
                            let _ = tx.send(SyncMessage::File(local));
                        }
                    }
                    Err(err) => warn!(error = %err, "filesystem watcher error"),
                })?
            }
        };
        Ok(self.inner.insert(watcher))
    }
}

impl FilesystemWatcher for NotifyWatcher {
    fn watch_roots(&mut self, roots: &[PathBuf]) -> Vec<WatchFailure> {
        let watcher = match self.attach() {
            Ok(watcher) => watcher,
            Err(err) => {
                return roots
                    .iter()
                    .map(|root| WatchFailure::new(root, &err))
                    .collect();
            }
        };
        let mut failures = Vec::new();
        for root in roots {
            match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => debug!(root = %root.display(), "watching root"),
                Err(err) => failures.push(WatchFailure::new(root, err)),
            }
        }
        failures
    }

    fn unwatch_roots(&mut self, roots: &[PathBuf]) {
        let Some(watcher) = self.inner.as_mut() else {
            return;
        };
        for root in roots {
            if let Err(err) = watcher.unwatch(root) {
                debug!(root = %root.display(), error = %err, "unwatch failed");
            }
        }
    }

    fn detach(&mut self) {
        self.inner = None;
    }
}

fn map_event(event: Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FileEvent::removed(from), FileEvent::created(to)],
                _ => Vec::new(),
            }
        }
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(FileEvent::created)
            .collect(),
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .into_iter()
            .map(FileEvent::removed)
            .collect(),
        _ => Vec::new(),
    }
}
