//! Pending notification queue
//!
//! Entries cleared during pre-sweep that have observers wait here until the
//! post-collection phase delivers them. The queue is drained exactly once
//! per collection, most recently cleared entry first.

use crate::entry::EntryId;
use rustc_hash::FxHashSet;

/// Entries awaiting delivery to their observer queues
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<EntryId>,
    /// Queued entries whose wrapper was reclaimed; skipped by `pop`
    cancelled: FxHashSet<EntryId>,
}

impl NotificationQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a just-cleared entry.
    ///
    /// The caller owns the entry's `pending_notify` flag and must only push
    /// entries that are not already queued.
    pub fn push(&mut self, entry: EntryId) {
        if self.cancelled.remove(&entry)
            && let Some(index) = self.pending.iter().rposition(|queued| *queued == entry)
        {
            // The slot was reused before the stale copy was drained.
            self.pending.remove(index);
        }
        self.pending.push(entry);
    }

    /// Take the most recently queued entry that is still wanted
    pub fn pop(&mut self) -> Option<EntryId> {
        loop {
            let entry = self.pending.pop()?;
            if !self.cancelled.remove(&entry) {
                return Some(entry);
            }
        }
    }

    /// Drop a queued entry whose wrapper is being reclaimed.
    ///
    /// Only call this for an entry that is queued. The stale copy stays in
    /// place until `pop` reaches it.
    pub fn cancel(&mut self, entry: EntryId) -> bool {
        self.cancelled.insert(entry)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.pending.len() - self.cancelled.len()
    }

    /// Returns true if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drains_lifo() {
        let mut queue = NotificationQueue::new();
        queue.push(EntryId::new(1));
        queue.push(EntryId::new(2));
        queue.push(EntryId::new(3));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some(EntryId::new(3)));
        assert_eq!(queue.pop(), Some(EntryId::new(2)));
        assert_eq!(queue.pop(), Some(EntryId::new(1)));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_keeps_count_in_sync() {
        let mut queue = NotificationQueue::new();
        queue.push(EntryId::new(1));
        queue.push(EntryId::new(2));
        queue.push(EntryId::new(3));

        assert!(queue.cancel(EntryId::new(2)));
        assert!(!queue.cancel(EntryId::new(2)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(EntryId::new(3)));
        assert_eq!(queue.pop(), Some(EntryId::new(1)));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_everything() {
        let mut queue = NotificationQueue::new();
        for index in 0..100 {
            queue.push(EntryId::new(index));
        }
        for index in 0..100 {
            queue.cancel(EntryId::new(index));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_after_cancel_replaces_stale_copy() {
        let mut queue = NotificationQueue::new();
        queue.push(EntryId::new(1));
        queue.push(EntryId::new(2));
        queue.cancel(EntryId::new(1));

        queue.push(EntryId::new(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(EntryId::new(1)));
        assert_eq!(queue.pop(), Some(EntryId::new(2)));
        assert_eq!(queue.pop(), None);
    }
}
