//! Reference entries: the records behind weak and soft reference wrappers.
//!
//! An entry never traces its target on its own. Whether the target is kept
//! alive is decided by [`ReferenceEntry::trace`], which only soft entries with
//! decay budget left use to re-mark the target.

use crate::error::{RefResult, ReferenceError};
use crate::object::{ObjectId, Value};

/// Reference discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Cleared as soon as the target is otherwise unreachable
    Weak,
    /// Cleared after its decay budget runs out
    Soft,
}

/// Index of an entry in the [`EntryArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Arena slot index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One registered observer queue.
///
/// `queue_weak` is a weak reference wrapper pointing at the queue, so an
/// entry that outlives its queue does not pin it.
#[derive(Debug)]
pub struct ObserverLink {
    queue_weak: ObjectId,
    next: Option<Box<ObserverLink>>,
}

impl ObserverLink {
    /// Weak wrapper of the observed queue
    pub fn queue_weak(&self) -> ObjectId {
        self.queue_weak
    }
}

/// Decision taken for one link during [`ObserverList::scan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScan {
    /// Leave the link in place and continue
    Keep,
    /// The link already observes the queue being attached; stop
    Match,
    /// The observed queue is gone; unlink
    Prune,
}

/// Result of an [`ObserverList::scan`]
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// A link matched and the scan stopped early
    pub matched: bool,
    /// Number of links unlinked
    pub pruned: usize,
    /// First pruned node, kept for reuse
    pub spare: Option<Box<ObserverLink>>,
}

/// Singly linked, exclusively owned list of observer links
#[derive(Debug, Default)]
pub struct ObserverList {
    head: Option<Box<ObserverLink>>,
}

impl ObserverList {
    /// Create an empty list
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Returns true if no queue is observing
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterate over the weak queue wrappers, head first
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        std::iter::successors(self.head.as_deref(), |link| link.next.as_deref())
            .map(|link| link.queue_weak)
    }

    /// Prepend a link, reusing `spare` when one is available
    pub fn push_front(&mut self, queue_weak: ObjectId, spare: Option<Box<ObserverLink>>) {
        let link = match spare {
            Some(mut node) => {
                node.queue_weak = queue_weak;
                node.next = self.head.take();
                node
            }
            None => Box::new(ObserverLink {
                queue_weak,
                next: self.head.take(),
            }),
        };
        self.head = Some(link);
    }

    /// Walk the list asking `visit` what to do with each link.
    ///
    /// Pruned links are unlinked in place; the first one is returned in
    /// [`ScanOutcome::spare`] and the rest are freed.
    pub fn scan(&mut self, mut visit: impl FnMut(ObjectId) -> LinkScan) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut cursor = &mut self.head;
        loop {
            let action = match cursor.as_deref() {
                Some(link) => visit(link.queue_weak),
                None => break,
            };
            match action {
                LinkScan::Match => {
                    outcome.matched = true;
                    break;
                }
                LinkScan::Prune => {
                    if let Some(mut dead) = cursor.take() {
                        *cursor = dead.next.take();
                        outcome.pruned += 1;
                        if outcome.spare.is_none() {
                            outcome.spare = Some(dead);
                        }
                    }
                }
                LinkScan::Keep => match cursor {
                    Some(link) => cursor = &mut link.next,
                    None => break,
                },
            }
        }
        outcome
    }

    /// Unlink and return every queue wrapper, head first
    pub fn take_all(&mut self) -> Vec<ObjectId> {
        let mut queues = Vec::new();
        while let Some(mut link) = self.head.take() {
            self.head = link.next.take();
            queues.push(link.queue_weak);
        }
        queues
    }

    /// Free every link
    pub fn clear(&mut self) {
        while let Some(mut link) = self.head.take() {
            self.head = link.next.take();
        }
    }
}

impl Drop for ObserverList {
    fn drop(&mut self) {
        self.clear();
    }
}

/// The record behind one reference wrapper
#[derive(Debug)]
pub struct ReferenceEntry {
    pub(crate) kind: ReferenceKind,
    /// Referenced value; `Value::Nil` once cleared
    pub(crate) target: Value,
    /// The client-visible wrapper object
    pub(crate) owner: ObjectId,
    /// Class of the wrapper
    pub(crate) class: ObjectId,
    /// Class row this entry is filed under, `None` once unregistered
    pub(crate) registry: Option<ObjectId>,
    pub(crate) observers: ObserverList,
    pub(crate) pending_notify: bool,
    pub(crate) decay_ttl: u16,
    pub(crate) decay_remaining: u16,
    pub(crate) touched: bool,
    pub(crate) sequence_id: u64,
}

impl ReferenceEntry {
    /// Reference discipline
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Current target (`Value::Nil` once cleared)
    pub fn target(&self) -> Value {
        self.target
    }

    /// Wrapper object
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Wrapper class
    pub fn class(&self) -> ObjectId {
        self.class
    }

    /// Returns true while the entry is filed in a class table
    pub fn is_registered(&self) -> bool {
        self.registry.is_some()
    }

    /// Returns true while a notification is queued but not delivered
    pub fn is_pending_notify(&self) -> bool {
        self.pending_notify
    }

    /// Creation sequence number
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Decay reset value
    pub fn decay_ttl(&self) -> u16 {
        self.decay_ttl
    }

    /// Collections left before a soft target may be dropped
    pub fn decay_remaining(&self) -> u16 {
        self.decay_remaining
    }

    /// Returns true if the target was read since the last decay evaluation
    pub fn touched(&self) -> bool {
        self.touched
    }

    /// Observer links
    pub fn observers(&self) -> &ObserverList {
        &self.observers
    }

    /// Report the objects this entry keeps alive.
    ///
    /// Observer queue wrappers are always marked. Soft entries also mark their
    /// target while decay budget remains; weak entries never do.
    pub fn trace(&self, tracer: &mut dyn FnMut(ObjectId)) {
        for queue_weak in self.observers.iter() {
            tracer(queue_weak);
        }
        if self.kind == ReferenceKind::Soft && self.decay_remaining > 0 {
            if let Some(target) = self.target.as_object() {
                tracer(target);
            }
        }
    }

    /// Apply one decay evaluation; returns true when the budget is exhausted.
    pub(crate) fn decay(&mut self, decrement: u16) -> bool {
        if self.touched {
            self.decay_remaining = self.decay_ttl;
        } else {
            self.decay_remaining = self.decay_remaining.saturating_sub(decrement);
        }
        self.touched = false;
        self.decay_remaining == 0
    }
}

/// Slab of entries with a free list for slot reuse
#[derive(Debug, Default)]
pub struct EntryArena {
    slots: Vec<Option<ReferenceEntry>>,
    free: Vec<u32>,
}

impl EntryArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry`, reusing a freed slot when possible
    pub fn insert(&mut self, entry: ReferenceEntry) -> RefResult<EntryId> {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(entry);
                Ok(EntryId(index))
            }
            None => {
                let index = slot_index(self.slots.len())?;
                self.slots.push(Some(entry));
                Ok(EntryId(index))
            }
        }
    }

    /// Index the next [`insert`](Self::insert) will use.
    ///
    /// Fails once every `u32` index is taken.
    pub fn next_id(&self) -> RefResult<EntryId> {
        match self.free.last() {
            Some(&index) => Ok(EntryId(index)),
            None => slot_index(self.slots.len()).map(EntryId),
        }
    }

    /// Free a slot, returning its entry
    pub fn remove(&mut self, id: EntryId) -> Option<ReferenceEntry> {
        let entry = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        Some(entry)
    }

    /// Shared access
    pub fn get(&self, id: EntryId) -> Option<&ReferenceEntry> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Mutable access
    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut ReferenceEntry> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns true if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn slot_index(len: usize) -> RefResult<u32> {
    u32::try_from(len).map_err(|_| ReferenceError::EntryLimit)
}
