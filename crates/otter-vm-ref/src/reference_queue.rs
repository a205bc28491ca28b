//! Reference queue objects
//!
//! A queue receives the wrappers of cleared references it observes. Queued
//! wrappers are held strongly until the client takes them out.

use std::collections::VecDeque;

use crate::object::ObjectId;

/// Client-visible sink for cleared reference wrappers
#[derive(Debug, Default)]
pub struct ReferenceQueue {
    items: VecDeque<ObjectId>,
}

impl ReferenceQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleared wrapper
    pub fn push(&mut self, wrapper: ObjectId) {
        self.items.push_back(wrapper);
    }

    /// Remove the oldest wrapper
    pub fn shift(&mut self) -> Option<ObjectId> {
        self.items.pop_front()
    }

    /// Remove the newest wrapper
    pub fn pop(&mut self) -> Option<ObjectId> {
        self.items.pop_back()
    }

    /// Oldest wrapper without removing it
    pub fn peek(&self) -> Option<ObjectId> {
        self.items.front().copied()
    }

    /// Number of queued wrappers
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every queued wrapper
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.items.iter().copied()
    }

    pub(crate) fn trace(&self, tracer: &mut dyn FnMut(ObjectId)) {
        for wrapper in &self.items {
            tracer(*wrapper);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(bits: u64) -> ObjectId {
        ObjectId::from_bits(bits)
    }

    #[test]
    fn test_shift_and_pop_ends() {
        let mut queue = ReferenceQueue::new();
        queue.push(id(1));
        queue.push(id(2));
        queue.push(id(3));

        assert_eq!(queue.peek(), Some(id(1)));
        assert_eq!(queue.shift(), Some(id(1)));
        assert_eq!(queue.pop(), Some(id(3)));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.shift(), None);
    }

    #[test]
    fn test_trace_reports_items() {
        let mut queue = ReferenceQueue::new();
        queue.push(id(4));
        queue.push(id(5));

        let mut seen = Vec::new();
        queue.trace(&mut |obj| seen.push(obj));
        assert_eq!(seen, vec![id(4), id(5)]);
    }
}
