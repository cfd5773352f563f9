//! Per-item work tracking with a single priority slot

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one unit of enrichment work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnrichKey {
    File(PathBuf),
    /// One code block of a file, named as structure analysis reported it.
    Block { file: PathBuf, block: String },
}

impl EnrichKey {
    pub fn block(file: impl Into<PathBuf>, block: impl Into<String>) -> Self {
        EnrichKey::Block { file: file.into(), block: block.into() }
    }

    pub fn file(&self) -> &Path {
        match self {
            EnrichKey::File(path) => path,
            EnrichKey::Block { file, .. } => file,
        }
    }
}

impl fmt::Display for EnrichKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichKey::File(path) => write!(f, "{}", path.display()),
            EnrichKey::Block { file, block } => write!(f, "{}#{}", file.display(), block),
        }
    }
}

/// One dispatch round taken from a [`WorkQueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub keys: Vec<EnrichKey>,
    /// The round is the priority key, dispatched alone.
    pub prioritized: bool,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    InProgress,
    Done,
}

/// Pending keys in arrival order plus the state of every key seen.
///
/// A key appears in at most one batch at a time: `next_batch` moves keys to
/// `InProgress`, and only `complete` or `release` take them out again.
#[derive(Debug, Default)]
pub struct WorkQueue {
    pending: VecDeque<EnrichKey>,
    states: HashMap<EnrichKey, ItemState>,
    priority: Option<EnrichKey>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the key has never been queued, or was released or invalidated.
    pub fn state(&self, key: &EnrichKey) -> Option<ItemState> {
        self.states.get(key).copied()
    }

    /// Add a key unless it is already known. Done keys are cache hits.
    pub fn enqueue(&mut self, key: EnrichKey) -> bool {
        if self.states.contains_key(&key) {
            return false;
        }
        self.states.insert(key.clone(), ItemState::Pending);
        self.pending.push_back(key);
        true
    }

    /// Add a key ahead of the backlog, or move it there if already pending.
    pub fn enqueue_front(&mut self, key: EnrichKey) -> bool {
        match self.state(&key) {
            None => {
                self.states.insert(key.clone(), ItemState::Pending);
            }
            Some(ItemState::Pending) => self.pending.retain(|k| k != &key),
            Some(_) => return false,
        }
        self.pending.push_front(key);
        true
    }

    /// Put `key` in the priority slot, queueing it first if needed.
    pub fn promote(&mut self, key: EnrichKey) {
        self.enqueue(key.clone());
        if self.state(&key) == Some(ItemState::Pending) {
            self.priority = Some(key);
        }
    }

    pub fn priority(&self) -> Option<&EnrichKey> {
        self.priority.as_ref()
    }

    /// Take the next dispatch round.
    ///
    /// A pending priority key is returned alone, ahead of the backlog, and the
    /// slot is cleared. Otherwise up to `size` keys come off the front.
    pub fn next_batch(&mut self, size: usize) -> Batch {
        if let Some(key) = self.priority.take() {
            if self.state(&key) == Some(ItemState::Pending) {
                self.pending.retain(|k| k != &key);
                self.states.insert(key.clone(), ItemState::InProgress);
                return Batch { keys: vec![key], prioritized: true };
            }
        }

        let take = size.max(1).min(self.pending.len());
        let keys: Vec<EnrichKey> = self.pending.drain(..take).collect();
        for key in &keys {
            self.states.insert(key.clone(), ItemState::InProgress);
        }
        Batch { keys, prioritized: false }
    }

    /// Mark an in-progress key done. Keys invalidated mid-flight stay forgotten.
    pub fn complete(&mut self, key: &EnrichKey) {
        if self.state(key) == Some(ItemState::InProgress) {
            self.states.insert(key.clone(), ItemState::Done);
        }
    }

    /// Forget an in-progress key after a failure so a later pass can queue it again.
    pub fn release(&mut self, key: &EnrichKey) {
        if self.state(key) == Some(ItemState::InProgress) {
            self.states.remove(key);
        }
    }

    /// Drop every trace of `key`, including a done result.
    pub fn invalidate(&mut self, key: &EnrichKey) {
        self.states.remove(key);
        self.pending.retain(|k| k != key);
        if self.priority.as_ref() == Some(key) {
            self.priority = None;
        }
    }

    /// Invalidate every key belonging to `file`.
    pub fn invalidate_file(&mut self, file: &Path) {
        let keys: Vec<EnrichKey> = self.states.keys().filter(|k| k.file() == file).cloned().collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_progress_len(&self) -> usize {
        self.states.values().filter(|s| **s == ItemState::InProgress).count()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> EnrichKey {
        EnrichKey::File(PathBuf::from(format!("/repo/{name}")))
    }

    #[test]
    fn test_batches_follow_arrival_order() {
        let mut queue = WorkQueue::new();
        for name in ["a", "b", "c", "d", "e"] {
            assert!(queue.enqueue(key(name)));
        }

        assert_eq!(queue.next_batch(3).keys, [key("a"), key("b"), key("c")]);
        assert_eq!(queue.in_progress_len(), 3);
        assert_eq!(queue.next_batch(3).keys, [key("d"), key("e")]);
        assert!(queue.next_batch(3).is_empty());
    }

    #[test]
    fn test_done_keys_are_cache_hits() {
        let mut queue = WorkQueue::new();
        queue.enqueue(key("a"));
        let batch = queue.next_batch(1);
        queue.complete(&batch.keys[0]);

        assert!(!queue.enqueue(key("a")));
        assert_eq!(queue.state(&key("a")), Some(ItemState::Done));

        queue.invalidate(&key("a"));
        assert!(queue.enqueue(key("a")));
    }

    #[test]
    fn test_enqueue_front_goes_ahead_of_backlog() {
        let mut queue = WorkQueue::new();
        for name in ["a", "b", "c"] {
            queue.enqueue(key(name));
        }
        assert!(queue.enqueue_front(key("x")));
        assert!(queue.enqueue_front(key("c")));

        assert_eq!(queue.next_batch(2).keys, [key("c"), key("x")]);
        assert!(!queue.enqueue_front(key("x")));
        assert_eq!(queue.next_batch(5).keys, [key("a"), key("b")]);
    }

    #[test]
    fn test_priority_jumps_the_backlog_once() {
        let mut queue = WorkQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.enqueue(key(name));
        }
        assert_eq!(queue.next_batch(2).keys, [key("a"), key("b")]);

        queue.promote(key("d"));
        let batch = queue.next_batch(2);
        assert!(batch.prioritized);
        assert_eq!(batch.keys, [key("d")]);
        assert!(queue.priority().is_none());
        assert_eq!(queue.next_batch(2).keys, [key("c")]);
    }

    #[test]
    fn test_priority_for_unseen_key_is_queued() {
        let mut queue = WorkQueue::new();
        queue.enqueue(key("a"));
        queue.promote(key("z"));
        assert_eq!(queue.next_batch(5).keys, [key("z")]);
        assert_eq!(queue.next_batch(5).keys, [key("a")]);
    }

    #[test]
    fn test_priority_ignored_for_in_flight_key() {
        let mut queue = WorkQueue::new();
        queue.enqueue(key("a"));
        queue.enqueue(key("b"));
        let _ = queue.next_batch(1);

        queue.promote(key("a"));
        assert!(queue.priority().is_none());
        assert_eq!(queue.next_batch(1).keys, [key("b")]);
    }

    #[test]
    fn test_complete_ignores_invalidated_key() {
        let mut queue = WorkQueue::new();
        queue.enqueue(key("a"));
        let batch = queue.next_batch(1);
        queue.invalidate(&key("a"));
        queue.complete(&batch.keys[0]);
        assert_eq!(queue.state(&key("a")), None);
    }

    #[test]
    fn test_release_allows_requeue() {
        let mut queue = WorkQueue::new();
        queue.enqueue(key("a"));
        let batch = queue.next_batch(1);
        assert!(!queue.enqueue(key("a")));

        queue.release(&batch.keys[0]);
        assert_eq!(queue.state(&key("a")), None);
        assert!(queue.enqueue(key("a")));
    }

    #[test]
    fn test_invalidate_file_covers_blocks() {
        let mut queue = WorkQueue::new();
        let file = PathBuf::from("/repo/a.ts");
        queue.enqueue(EnrichKey::block(&file, "one"));
        queue.enqueue(EnrichKey::block(&file, "two"));
        queue.enqueue(EnrichKey::block("/repo/b.ts", "one"));

        queue.invalidate_file(&file);
        assert_eq!(queue.state(&EnrichKey::block(&file, "one")), None);
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.next_batch(5).keys, [EnrichKey::block("/repo/b.ts", "one")]);
    }
}
