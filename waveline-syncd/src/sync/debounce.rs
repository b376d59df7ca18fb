use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use super::local_watcher::{FileEvent, FileEventKind};

pub const DEFAULT_EXTENSIONS: [&str; 3] = [".mp3", ".flac", ".m4a"];
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_secs(3);

/// Accepted file suffixes, compared exactly as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Parses a comma separated list such as `.mp3,.flac`. Returns `None`
    /// when the list holds no usable extension.
    pub fn parse(list: &str) -> Option<Self> {
        let filter = Self::new(list.split(','));
        (!filter.extensions.is_empty()).then_some(filter)
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|allowed| allowed == ext)
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// Collects created audio files until no new one has arrived for a full
/// quiet window.
#[derive(Debug)]
pub struct DebounceBatcher {
    filter: ExtensionFilter,
    quiet_window: Duration,
    pending: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    deadline: Option<Instant>,
}

impl DebounceBatcher {
    pub fn new(filter: ExtensionFilter, quiet_window: Duration) -> Self {
        Self {
            filter,
            quiet_window,
            pending: Vec::new(),
            seen: HashSet::new(),
            deadline: None,
        }
    }

    /// Records `event` and re-arms the quiet window when it qualifies.
    /// Returns whether the event qualified.
    pub fn observe(&mut self, event: &FileEvent, now: Instant) -> bool {
        if event.kind != FileEventKind::Created || !self.filter.accepts(&event.path) {
            return false;
        }
        if self.seen.insert(event.path.clone()) {
            self.pending.push(event.path.clone());
        }
        self.deadline = Some(now + self.quiet_window);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending(&self) -> &[PathBuf] {
        &self.pending
    }

    pub fn is_batching(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the batch if the quiet window has elapsed at `now`. A fire
    /// before the deadline, or with nothing pending, yields `None`.
    pub fn poll_flush(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        self.seen.clear();
        Some(std::mem::take(&mut self.pending))
    }
}
