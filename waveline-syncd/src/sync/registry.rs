use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::local_watcher::FilesystemWatcher;
use crate::progress::ProgressSink;
use crate::settings::{SettingsKey, SettingsStore};

/// Owns the watched roots and the only code path that persists them.
pub struct WatchRegistry {
    roots: Vec<PathBuf>,
    store: Box<dyn SettingsStore>,
    watcher: Box<dyn FilesystemWatcher>,
    sink: Arc<dyn ProgressSink>,
    active: bool,
}

impl WatchRegistry {
    /// Reads the persisted roots. Missing or invalid data yields no roots.
    pub fn load(
        store: Box<dyn SettingsStore>,
        watcher: Box<dyn FilesystemWatcher>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let roots = store
            .get_string(SettingsKey::Roots)
            .map(|raw| parse_roots(&raw))
            .unwrap_or_default();
        debug!(roots = roots.len(), "loaded watch roots");
        Self {
            roots,
            store,
            watcher,
            sink,
            active: false,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn root_strings(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|root| root.to_string_lossy().into_owned())
            .collect()
    }

    pub fn is_watching(&self) -> bool {
        self.active
    }

    /// Adds roots not already present and returns only those. New roots are
    /// observed right away when the registry is watching.
    pub fn add_roots<I>(&mut self, roots: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut known: HashSet<PathBuf> = self.roots.iter().cloned().collect();
        let added: Vec<PathBuf> = roots
            .into_iter()
            .filter(|root| known.insert(root.clone()))
            .collect();
        if added.is_empty() {
            return added;
        }

        self.roots.extend(added.iter().cloned());
        self.persist();
        if self.active {
            self.observe(&added);
        }
        info!(added = added.len(), total = self.roots.len(), "watch roots added");
        added
    }

    /// Forgets `roots` and stops observing them. Returns the ones removed.
    pub fn remove_roots(&mut self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let targets: HashSet<&PathBuf> = roots.iter().collect();
        let (removed, kept): (Vec<PathBuf>, Vec<PathBuf>) = std::mem::take(&mut self.roots)
            .into_iter()
            .partition(|root| targets.contains(root));
        self.roots = kept;
        if removed.is_empty() {
            return removed;
        }

        self.persist();
        if self.active {
            self.watcher.unwatch_roots(&removed);
        }
        info!(removed = removed.len(), total = self.roots.len(), "watch roots removed");
        removed
    }

    /// Starts the watcher for every root unless it already runs.
    pub fn watch(&mut self) -> Vec<PathBuf> {
        if !self.active {
            self.active = true;
            let roots = self.roots.clone();
            self.observe(&roots);
            info!(roots = self.roots.len(), "watching");
        }
        self.roots.clone()
    }

    /// Detaches the watcher but keeps the roots for the next `watch()`.
    pub fn unwatch(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.watcher.detach();
        info!("stopped watching");
    }

    /// Unwatches and forgets every root, as on disconnect.
    pub fn clear(&mut self) {
        self.unwatch();
        self.roots.clear();
        self.persist();
    }

    fn observe(&mut self, roots: &[PathBuf]) {
        for failure in self.watcher.watch_roots(roots) {
            warn!(root = %failure.root.display(), reason = %failure.reason, "cannot watch root");
            self.sink.on_error("watch", &failure);
        }
    }

    fn persist(&mut self) {
        let encoded = match serde_json::to_string(&self.root_strings()) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed to encode watch roots");
                return;
            }
        };
        self.store.set_string(SettingsKey::Roots, encoded);
        if let Err(err) = self.store.persist() {
            warn!(error = %err, "failed to persist watch roots");
        }
    }
}

fn parse_roots(raw: &str) -> Vec<PathBuf> {
    let Ok(list) = serde_json::from_str::<Vec<String>>(raw) else {
        warn!("ignoring unreadable watch root list");
        return Vec::new();
    };
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|root| !root.is_empty())
        .map(PathBuf::from)
        .filter(|root| seen.insert(root.clone()))
        .collect()
}
