//! Map with weakly held keys
//!
//! Each key is tracked through a weak reference observed by the map's own
//! reference queue. Once a key is collected its wrapper shows up in the queue
//! and the next [`WeakKeyMap::purge`] forgets the entry. Values are plain
//! Rust values and are not traced by the collector.

use rustc_hash::FxHashMap;

use crate::error::RefResult;
use crate::heap::Heap;
use crate::object::ObjectId;
use crate::reference::ReferenceSystem;

struct Slot<V> {
    wrapper: ObjectId,
    value: V,
}

/// Map keyed weakly by heap objects
pub struct WeakKeyMap<V> {
    queue: ObjectId,
    slots: FxHashMap<ObjectId, Slot<V>>,
    keys_by_wrapper: FxHashMap<ObjectId, ObjectId>,
}

impl<V> WeakKeyMap<V> {
    /// Create an empty map, allocating and rooting its queue
    pub fn new(heap: &mut Heap) -> RefResult<Self> {
        let queue = heap.alloc_queue()?;
        heap.add_root(queue);
        Ok(Self {
            queue,
            slots: FxHashMap::default(),
            keys_by_wrapper: FxHashMap::default(),
        })
    }

    /// Queue receiving the wrappers of collected keys
    pub fn queue(&self) -> ObjectId {
        self.queue
    }

    /// Insert or replace the value for `key`; returns the previous value
    pub fn insert(
        &mut self,
        refs: &mut ReferenceSystem,
        heap: &mut Heap,
        key: ObjectId,
        value: V,
    ) -> RefResult<Option<V>> {
        self.purge(heap);
        if let Some(slot) = self.slots.get_mut(&key) {
            return Ok(Some(std::mem::replace(&mut slot.value, value)));
        }

        let wrapper = refs.weak_new(heap, key.into(), Some(self.queue))?;
        heap.add_root(wrapper);
        self.keys_by_wrapper.insert(wrapper, key);
        self.slots.insert(key, Slot { wrapper, value });
        Ok(None)
    }

    /// Value stored for `key`
    pub fn get(&self, key: ObjectId) -> Option<&V> {
        self.slots.get(&key).map(|slot| &slot.value)
    }

    /// Mutable value stored for `key`
    pub fn get_mut(&mut self, key: ObjectId) -> Option<&mut V> {
        self.slots.get_mut(&key).map(|slot| &mut slot.value)
    }

    /// Returns true if `key` has an entry
    pub fn contains_key(&self, key: ObjectId) -> bool {
        self.slots.contains_key(&key)
    }

    /// Remove the entry for `key`
    pub fn remove(&mut self, heap: &mut Heap, key: ObjectId) -> Option<V> {
        let slot = self.slots.remove(&key)?;
        self.keys_by_wrapper.remove(&slot.wrapper);
        heap.remove_root(slot.wrapper);
        Some(slot.value)
    }

    /// Forget every entry whose key has been collected; returns how many
    pub fn purge(&mut self, heap: &mut Heap) -> usize {
        let mut purged = 0;
        while let Some(wrapper) = heap.queue_mut(self.queue).and_then(|queue| queue.shift()) {
            let Some(key) = self.keys_by_wrapper.remove(&wrapper) else {
                continue;
            };
            self.slots.remove(&key);
            heap.remove_root(wrapper);
            purged += 1;
        }
        if purged > 0 {
            tracing::debug!(target: "otter::reference", purged, "weak key map purged");
        }
        purged
    }

    /// Number of entries, including keys collected since the last purge
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current keys, in no particular order
    pub fn keys(&self) -> Vec<ObjectId> {
        self.slots.keys().copied().collect()
    }

    /// Drop the map and unroot everything it rooted
    pub fn release(self, heap: &mut Heap) {
        for slot in self.slots.values() {
            heap.remove_root(slot.wrapper);
        }
        heap.remove_root(self.queue);
    }
}

impl<V> std::fmt::Debug for WeakKeyMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakKeyMap")
            .field("queue", &self.queue)
            .field("len", &self.slots.len())
            .finish()
    }
}
