use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A file the server asked for, with the roots it was planned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUpload {
    pub path: String,
    pub roots: Arc<[String]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The queue was idle; the caller now owns the drain loop.
    Started { queued: usize },
    /// A drain is already running and will pick these items up.
    Merged { queued: usize },
}

#[derive(Debug, Default)]
struct QueueInner {
    syncing: bool,
    items: VecDeque<QueuedUpload>,
    processed: usize,
}

/// Upload queue shared between the drain loop and late reconciliations.
///
/// All transitions happen under one lock: appending while syncing, taking
/// the next item, and going idle once the queue is empty. An admission can
/// therefore never land between the last `next()` and the idle transition.
#[derive(Debug, Clone, Default)]
pub struct SyncQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl SyncQueue {
    pub fn admit(&self, items: Vec<QueuedUpload>) -> Admission {
        let mut inner = self.lock();
        if inner.syncing {
            inner.items.extend(items);
            return Admission::Merged {
                queued: inner.items.len(),
            };
        }
        inner.syncing = true;
        inner.processed = 0;
        inner.items = items.into();
        Admission::Started {
            queued: inner.items.len(),
        }
    }

    /// Pops the next item, or marks the queue idle when nothing is left.
    pub fn next(&self) -> Option<QueuedUpload> {
        let mut inner = self.lock();
        match inner.items.pop_front() {
            Some(item) => {
                inner.processed += 1;
                Some(item)
            }
            None => {
                inner.syncing = false;
                inner.processed = 0;
                None
            }
        }
    }

    /// `(index, total)` of the item most recently taken, counting items
    /// merged in since the drain started.
    pub fn progress(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.processed, inner.processed + inner.items.len())
    }

    pub fn is_syncing(&self) -> bool {
        self.lock().syncing
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .items
            .iter()
            .map(|item| item.path.clone())
            .collect()
    }

    /// Forces the idle state and drops whatever is still queued.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.syncing = false;
        inner.processed = 0;
        inner.items.clear();
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploads(paths: &[&str]) -> Vec<QueuedUpload> {
        let roots: Arc<[String]> = Arc::from(vec!["/music".to_string()]);
        paths
            .iter()
            .map(|path| QueuedUpload {
                path: path.to_string(),
                roots: Arc::clone(&roots),
            })
            .collect()
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = SyncQueue::default();
        assert_eq!(
            queue.admit(uploads(&["/music/a.mp3", "/music/b.mp3"])),
            Admission::Started { queued: 2 }
        );

        assert_eq!(queue.next().unwrap().path, "/music/a.mp3");
        assert_eq!(queue.progress(), (1, 2));
        assert_eq!(queue.next().unwrap().path, "/music/b.mp3");
        assert_eq!(queue.progress(), (2, 2));
        assert!(queue.next().is_none());
        assert!(!queue.is_syncing());
    }

    #[test]
    fn admission_while_syncing_appends_to_live_queue() {
        let queue = SyncQueue::default();
        queue.admit(uploads(&["/music/a.mp3", "/music/b.mp3"]));
        assert_eq!(queue.next().unwrap().path, "/music/a.mp3");

        assert_eq!(
            queue.admit(uploads(&["/music/c.mp3", "/music/b.mp3"])),
            Admission::Merged { queued: 3 }
        );
        assert_eq!(
            queue.paths(),
            vec!["/music/b.mp3", "/music/c.mp3", "/music/b.mp3"]
        );
        assert_eq!(queue.progress(), (1, 4));
    }

    #[test]
    fn admission_when_idle_replaces_queue() {
        let queue = SyncQueue::default();
        queue.admit(uploads(&["/music/a.mp3"]));
        queue.next();
        assert!(queue.next().is_none());

        assert_eq!(
            queue.admit(uploads(&["/music/z.mp3"])),
            Admission::Started { queued: 1 }
        );
        assert_eq!(queue.paths(), vec!["/music/z.mp3"]);
        assert_eq!(queue.progress(), (0, 1));
    }

    #[test]
    fn reset_returns_to_idle() {
        let queue = SyncQueue::default();
        queue.admit(uploads(&["/music/a.mp3", "/music/b.mp3"]));
        queue.reset();
        assert!(!queue.is_syncing());
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
