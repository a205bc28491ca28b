//! Weak and soft references
//!
//! [`ReferenceSystem`] owns every reference entry together with the class
//! registries, the pending notification queue and the pressure controller.
//! It is handed to the host collector as its [`CollectionHooks`]:
//!
//! 1. **Mark**: a soft entry re-marks its target while it has decay budget
//!    left, and every entry marks the weak wrappers of its observer queues.
//! 2. **Before sweep**: rows of dead classes are dropped, then weak entries
//!    whose target was not marked are cleared, then soft entries decay and
//!    are cleared once their budget is exhausted.
//! 3. **Finalize**: a reclaimed wrapper destroys its entry.
//! 4. **After collection**: cleared entries are delivered to their observer
//!    queues, most recently cleared first.

use crate::config::ReferenceConfig;
use crate::entry::{
    EntryArena, EntryId, LinkScan, ObserverList, ReferenceEntry, ReferenceKind,
};
use crate::error::{RefResult, ReferenceError};
use crate::heap::{CollectionHooks, GcPhase, Heap, ObjectKind};
use crate::notify::NotificationQueue;
use crate::object::{ObjectId, Value};
use crate::pressure::PressureController;
use crate::registry::ClassRegistry;

/// Name of the base weak reference class
pub const WEAK_REFERENCE_CLASS: &str = "WeakReference";

/// Name of the base soft reference class
pub const SOFT_REFERENCE_CLASS: &str = "SoftReference";

/// Reference subsystem statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceStats {
    /// Entries whose wrapper has not been reclaimed
    pub live_instances: usize,
    /// Weak entries filed in class tables
    pub weak_cached: usize,
    /// Soft entries filed in class tables
    pub soft_cached: usize,
    /// Cleared entries waiting for delivery
    pub pending_notifications: usize,
    /// Pressure events recorded since the last collection
    pub pressure_events: usize,
    /// Decrement used by the last soft decay evaluation
    pub last_decrement: u16,
    /// Collections processed
    pub collections: u64,
    /// Entries cleared by collections or explicit `clear`
    pub total_cleared: u64,
    /// Wrappers appended to observer queues
    pub total_notified: u64,
}

/// The reference subsystem context
#[derive(Debug)]
pub struct ReferenceSystem {
    config: ReferenceConfig,
    entries: EntryArena,
    weak: ClassRegistry,
    soft: ClassRegistry,
    notifications: NotificationQueue,
    pressure: PressureController,
    weak_class: ObjectId,
    soft_class: ObjectId,
    default_soft_ttl: u16,
    live_count: usize,
    sequence: u64,
    collections: u64,
    total_cleared: u64,
    total_notified: u64,
}

impl ReferenceSystem {
    /// Create the subsystem, defining and rooting the base weak and soft
    /// reference classes in `heap`
    pub fn new(heap: &mut Heap, config: ReferenceConfig) -> RefResult<Self> {
        let weak_class = heap.alloc_class(WEAK_REFERENCE_CLASS, None, Some(ReferenceKind::Weak))?;
        let soft_class = heap.alloc_class(SOFT_REFERENCE_CLASS, None, Some(ReferenceKind::Soft))?;
        heap.add_root(weak_class);
        heap.add_root(soft_class);

        Ok(Self {
            default_soft_ttl: config.default_soft_ttl,
            config,
            entries: EntryArena::new(),
            weak: ClassRegistry::new(ReferenceKind::Weak),
            soft: ClassRegistry::new(ReferenceKind::Soft),
            notifications: NotificationQueue::new(),
            pressure: PressureController::new(),
            weak_class,
            soft_class,
            live_count: 0,
            sequence: 0,
            collections: 0,
            total_cleared: 0,
            total_notified: 0,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// Base weak reference class
    pub fn weak_class(&self) -> ObjectId {
        self.weak_class
    }

    /// Base soft reference class
    pub fn soft_class(&self) -> ObjectId {
        self.soft_class
    }

    /// Run a full collection of `heap` with this subsystem attached
    pub fn collect(&mut self, heap: &mut Heap) -> usize {
        heap.collect(self)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Weak reference to `target`, optionally observed by `queue`
    pub fn weak_new(
        &mut self,
        heap: &mut Heap,
        target: Value,
        queue: Option<ObjectId>,
    ) -> RefResult<ObjectId> {
        let class = self.weak_class;
        self.new_reference(heap, class, target, queue)
    }

    /// Soft reference to `target`, optionally observed by `queue`
    pub fn soft_new(
        &mut self,
        heap: &mut Heap,
        target: Value,
        queue: Option<ObjectId>,
    ) -> RefResult<ObjectId> {
        let class = self.soft_class;
        self.new_reference(heap, class, target, queue)
    }

    /// Reference of class `class` to `target`.
    ///
    /// Repeated requests for the same live `(class, target)` pair return the
    /// same wrapper. Immediate targets always get a fresh, uncached wrapper.
    pub fn new_reference(
        &mut self,
        heap: &mut Heap,
        class: ObjectId,
        target: Value,
        queue: Option<ObjectId>,
    ) -> RefResult<ObjectId> {
        let kind = reference_class_kind(heap, class)?;
        if let Some(queue) = queue {
            ensure_queue(heap, queue)?;
        }
        let wrapper = self.wrap(heap, class, kind, target)?;
        if queue.is_some() {
            self.attach_observer(heap, wrapper, queue)?;
        }
        Ok(wrapper)
    }

    /// Define a subclass of the base weak or soft reference class.
    ///
    /// Each class keeps its own cache, so a subclass and its parent hand out
    /// distinct wrappers for one target.
    pub fn define_class(
        &mut self,
        heap: &mut Heap,
        name: &str,
        kind: ReferenceKind,
    ) -> RefResult<ObjectId> {
        let base = match kind {
            ReferenceKind::Weak => self.weak_class,
            ReferenceKind::Soft => self.soft_class,
        };
        heap.alloc_class(name, Some(base), Some(kind))
    }

    /// Reference that keeps `target` alive
    pub fn hard_new(&mut self, heap: &mut Heap, target: Value) -> RefResult<ObjectId> {
        heap.allocate(ObjectKind::HardReference { target })
    }

    fn wrap(
        &mut self,
        heap: &mut Heap,
        class: ObjectId,
        kind: ReferenceKind,
        target: Value,
    ) -> RefResult<ObjectId> {
        let Some(target_id) = target.as_object() else {
            return self
                .allocate_entry(heap, class, kind, target, None)
                .map(|(owner, _)| owner);
        };

        if let Some(existing) = self.registry(kind).lookup(class, target_id) {
            if let Some(entry) = self.entries.get(existing) {
                return Ok(entry.owner);
            }
        }

        // Reserve the table slot and allocate the wrapper before filing it,
        // so a failure leaves the registries as they were.
        let fresh_row = self.registry(kind).table(class).is_none();
        let created = self
            .registry_mut(kind)
            .table_for_class(class)
            .try_reserve(1)
            .map_err(ReferenceError::from)
            .and_then(|()| self.allocate_entry(heap, class, kind, target, Some(class)));

        match created {
            Ok((owner, entry)) => {
                self.registry_mut(kind)
                    .table_for_class(class)
                    .insert(target_id, entry);
                Ok(owner)
            }
            Err(err) => {
                if fresh_row {
                    self.registry_mut(kind).remove_empty_row(class);
                }
                Err(err)
            }
        }
    }

    fn allocate_entry(
        &mut self,
        heap: &mut Heap,
        class: ObjectId,
        kind: ReferenceKind,
        target: Value,
        registry: Option<ObjectId>,
    ) -> RefResult<(ObjectId, EntryId)> {
        let id = self.entries.next_id()?;
        let owner = heap.allocate(ObjectKind::Reference { class, entry: id })?;
        let ttl = match kind {
            ReferenceKind::Weak => 0,
            ReferenceKind::Soft => self.default_soft_ttl,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let inserted = self.entries.insert(ReferenceEntry {
            kind,
            target,
            owner,
            class,
            registry,
            observers: ObserverList::new(),
            pending_notify: false,
            decay_ttl: ttl,
            decay_remaining: ttl,
            touched: false,
            sequence_id: self.sequence,
        })?;
        debug_assert_eq!(inserted, id);
        self.live_count += 1;
        Ok((owner, id))
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register `queue` to receive `wrapper` once it is cleared.
    ///
    /// Links to queues that have died are pruned on the way. Passing `None`
    /// only prunes. References to immediates never notify, so their queue is
    /// ignored.
    pub fn attach_observer(
        &mut self,
        heap: &mut Heap,
        wrapper: ObjectId,
        queue: Option<ObjectId>,
    ) -> RefResult<ObjectId> {
        let id = entry_id(heap, wrapper)?;
        if let Some(queue) = queue {
            ensure_queue(heap, queue)?;
        }
        let tracked = self
            .entries
            .get(id)
            .ok_or(ReferenceError::Collected(wrapper))?
            .target
            .as_object()
            .is_some();

        let weak_class = self.weak_class;
        let queue_weak = match queue {
            Some(queue) if tracked => {
                Some(self.wrap(heap, weak_class, ReferenceKind::Weak, Value::Object(queue))?)
            }
            _ => None,
        };

        let Some(entry) = self.entries.get_mut(id) else {
            return Err(ReferenceError::Collected(wrapper));
        };
        let mut observers = std::mem::take(&mut entry.observers);

        let entries = &self.entries;
        let heap_view: &Heap = heap;
        let outcome = observers.scan(|link| {
            if Some(link) == queue_weak {
                return LinkScan::Match;
            }
            match resolve_weak(entries, heap_view, link) {
                Value::Nil => LinkScan::Prune,
                resolved if queue.is_some_and(|queue| resolved == Value::Object(queue)) => {
                    LinkScan::Match
                }
                _ => LinkScan::Keep,
            }
        });

        if !outcome.matched {
            if let Some(queue_weak) = queue_weak {
                observers.push_front(queue_weak, outcome.spare);
            }
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.observers = observers;
        }
        Ok(wrapper)
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    /// Current target of a hard, weak or soft wrapper; `Nil` once cleared.
    ///
    /// Reading a soft reference counts as a use and refreshes its budget at
    /// the next decay evaluation.
    pub fn get_target(&mut self, heap: &Heap, wrapper: ObjectId) -> RefResult<Value> {
        match heap.kind(wrapper) {
            Some(ObjectKind::HardReference { target }) => Ok(*target),
            Some(ObjectKind::Reference { entry, .. }) => {
                let entry = self
                    .entries
                    .get_mut(*entry)
                    .ok_or(ReferenceError::Collected(wrapper))?;
                if entry.kind == ReferenceKind::Soft && !entry.target.is_nil() {
                    entry.touched = true;
                }
                Ok(entry.target)
            }
            Some(_) => Err(ReferenceError::NotAReference(wrapper)),
            None => Err(ReferenceError::Collected(wrapper)),
        }
    }

    /// Current target without counting as a use
    pub fn peek_target(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<Value> {
        match heap.kind(wrapper) {
            Some(ObjectKind::HardReference { target }) => Ok(*target),
            Some(ObjectKind::Reference { entry, .. }) => self
                .entries
                .get(*entry)
                .map(|entry| entry.target)
                .ok_or(ReferenceError::Collected(wrapper)),
            Some(_) => Err(ReferenceError::NotAReference(wrapper)),
            None => Err(ReferenceError::Collected(wrapper)),
        }
    }

    /// Clear `wrapper` now.
    ///
    /// Weak and soft wrappers are dropped from their cache and their
    /// observers are notified after the next collection.
    pub fn clear(&mut self, heap: &mut Heap, wrapper: ObjectId) -> RefResult<()> {
        let id = match heap.kind_mut(wrapper) {
            Some(ObjectKind::HardReference { target }) => {
                *target = Value::Nil;
                return Ok(());
            }
            Some(ObjectKind::Reference { entry, .. }) => *entry,
            Some(_) => return Err(ReferenceError::NotAReference(wrapper)),
            None => return Err(ReferenceError::Collected(wrapper)),
        };

        let Self {
            entries,
            weak,
            soft,
            notifications,
            total_cleared,
            ..
        } = self;
        let entry = entries
            .get_mut(id)
            .ok_or(ReferenceError::Collected(wrapper))?;
        if let (Some(class), Some(target)) = (entry.registry, entry.target.as_object()) {
            let registry = match entry.kind {
                ReferenceKind::Weak => weak,
                ReferenceKind::Soft => soft,
            };
            registry.unregister(class, target, id);
        }
        if dereference(entry, id, notifications) {
            *total_cleared += 1;
        }
        Ok(())
    }

    /// Object identity of the current target, if it is a heap object
    pub fn referenced_object_id(
        &self,
        heap: &Heap,
        wrapper: ObjectId,
    ) -> RefResult<Option<ObjectId>> {
        Ok(self.peek_target(heap, wrapper)?.as_object())
    }

    /// Creation sequence number of a weak or soft wrapper
    pub fn reference_id(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<u64> {
        Ok(self.entry(heap, wrapper)?.sequence_id)
    }

    /// Discipline of a weak or soft wrapper
    pub fn reference_kind(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<ReferenceKind> {
        Ok(self.entry(heap, wrapper)?.kind)
    }

    /// Entry backing a weak or soft wrapper
    pub fn entry(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<&ReferenceEntry> {
        let id = entry_id(heap, wrapper)?;
        self.entries
            .get(id)
            .ok_or(ReferenceError::Collected(wrapper))
    }

    // ------------------------------------------------------------------
    // Soft decay
    // ------------------------------------------------------------------

    /// Decay reset value of a soft wrapper
    pub fn decay_ttl(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<u16> {
        Ok(self.soft_entry(heap, wrapper)?.decay_ttl)
    }

    /// Change the decay reset value of a soft wrapper
    pub fn set_decay_ttl(&mut self, heap: &Heap, wrapper: ObjectId, ttl: u16) -> RefResult<()> {
        self.soft_entry_mut(heap, wrapper)?.decay_ttl = ttl;
        Ok(())
    }

    /// Collections left before a soft wrapper's target may be dropped
    pub fn decay_remaining(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<u16> {
        Ok(self.soft_entry(heap, wrapper)?.decay_remaining)
    }

    /// Overwrite the remaining budget of a soft wrapper
    pub fn set_decay_remaining(
        &mut self,
        heap: &Heap,
        wrapper: ObjectId,
        remaining: u16,
    ) -> RefResult<()> {
        self.soft_entry_mut(heap, wrapper)?.decay_remaining = remaining;
        Ok(())
    }

    /// Returns true if a soft wrapper was read since the last evaluation
    pub fn touched(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<bool> {
        Ok(self.soft_entry(heap, wrapper)?.touched)
    }

    /// Set or reset the touched flag of a soft wrapper
    pub fn set_touched(&mut self, heap: &Heap, wrapper: ObjectId, touched: bool) -> RefResult<()> {
        self.soft_entry_mut(heap, wrapper)?.touched = touched;
        Ok(())
    }

    /// Budget given to soft references created from now on
    pub fn default_soft_ttl(&self) -> u16 {
        self.default_soft_ttl
    }

    /// Change the budget given to soft references created from now on
    pub fn set_default_soft_ttl(&mut self, ttl: u16) {
        self.default_soft_ttl = ttl;
    }

    fn soft_entry(&self, heap: &Heap, wrapper: ObjectId) -> RefResult<&ReferenceEntry> {
        let entry = self.entry(heap, wrapper)?;
        if entry.kind != ReferenceKind::Soft {
            return Err(ReferenceError::NotSoft(wrapper));
        }
        Ok(entry)
    }

    fn soft_entry_mut(&mut self, heap: &Heap, wrapper: ObjectId) -> RefResult<&mut ReferenceEntry> {
        let id = entry_id(heap, wrapper)?;
        let entry = self
            .entries
            .get_mut(id)
            .ok_or(ReferenceError::Collected(wrapper))?;
        if entry.kind != ReferenceKind::Soft {
            return Err(ReferenceError::NotSoft(wrapper));
        }
        Ok(entry)
    }

    // ------------------------------------------------------------------
    // Memory pressure
    // ------------------------------------------------------------------

    /// Pressure events recorded since the last collection
    pub fn memory_pressure(&self) -> usize {
        self.pressure.events()
    }

    /// Overwrite the pressure event counter
    pub fn set_memory_pressure(&mut self, events: usize) {
        self.pressure.set_events(events);
    }

    /// Record one pressure event
    pub fn record_pressure_event(&mut self) {
        self.pressure.record();
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Entries whose wrapper has not been reclaimed
    pub fn live_instance_count(&self) -> usize {
        self.live_count
    }

    /// Weak entries filed in class tables
    pub fn weak_cached_instance_count(&self) -> usize {
        self.weak.cached_count()
    }

    /// Soft entries filed in class tables
    pub fn soft_cached_instance_count(&self) -> usize {
        self.soft.cached_count()
    }

    /// Number of class rows in the registry of `kind`
    pub fn class_count(&self, kind: ReferenceKind) -> usize {
        self.registry(kind).class_count()
    }

    /// Cached wrapper for `(class, target)`, if any
    pub fn cached_reference(&self, class: ObjectId, target: ObjectId) -> Option<ObjectId> {
        self.weak
            .lookup(class, target)
            .or_else(|| self.soft.lookup(class, target))
            .and_then(|id| self.entries.get(id))
            .map(|entry| entry.owner)
    }

    /// Wrappers of every cached entry of `kind`
    pub fn references(&self, kind: ReferenceKind) -> Vec<ObjectId> {
        self.registry(kind)
            .iter_entries()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| entry.owner)
            .collect()
    }

    /// Collections processed so far
    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Snapshot of the subsystem counters
    pub fn stats(&self) -> ReferenceStats {
        ReferenceStats {
            live_instances: self.live_count,
            weak_cached: self.weak.cached_count(),
            soft_cached: self.soft.cached_count(),
            pending_notifications: self.notifications.len(),
            pressure_events: self.pressure.events(),
            last_decrement: self.pressure.last_decrement(),
            collections: self.collections,
            total_cleared: self.total_cleared,
            total_notified: self.total_notified,
        }
    }

    fn registry(&self, kind: ReferenceKind) -> &ClassRegistry {
        match kind {
            ReferenceKind::Weak => &self.weak,
            ReferenceKind::Soft => &self.soft,
        }
    }

    fn registry_mut(&mut self, kind: ReferenceKind) -> &mut ClassRegistry {
        match kind {
            ReferenceKind::Weak => &mut self.weak,
            ReferenceKind::Soft => &mut self.soft,
        }
    }

    /// Deliver every pending entry to its live observer queues
    fn drain_notifications(&mut self, heap: &mut Heap) -> usize {
        let mut delivered = 0;
        while let Some(id) = self.notifications.pop() {
            let Some(entry) = self.entries.get_mut(id) else {
                continue;
            };
            assert!(
                entry.pending_notify,
                "entry {id:?} queued for notification twice"
            );
            entry.pending_notify = false;
            let owner = entry.owner;

            for queue_weak in entry.observers.take_all() {
                let Value::Object(queue) = resolve_weak(&self.entries, heap, queue_weak) else {
                    continue;
                };
                if let Some(queue) = heap.queue_mut(queue) {
                    queue.push(owner);
                    delivered += 1;
                }
            }
        }
        self.total_notified += delivered as u64;
        delivered
    }
}

impl CollectionHooks for ReferenceSystem {
    fn memory_pressure(&mut self, events: usize) {
        self.pressure.record_many(events);
    }

    fn trace_reference(&self, entry: EntryId, tracer: &mut dyn FnMut(ObjectId)) {
        if let Some(entry) = self.entries.get(entry) {
            entry.trace(tracer);
        }
    }

    fn before_sweep(&mut self, heap: &Heap) {
        debug_assert_eq!(
            heap.phase(),
            GcPhase::BeforeSweep,
            "references must be checked after marking and before sweeping"
        );

        let trace = self.config.trace;
        let Self {
            entries,
            weak,
            soft,
            notifications,
            pressure,
            total_cleared,
            ..
        } = self;

        let mut released = 0usize;
        let mut dead_classes = 0usize;
        for registry in [&mut *weak, &mut *soft] {
            dead_classes += registry.remove_dead_classes(
                |class| heap.is_marked(class),
                |id| match entries.get_mut(id) {
                    Some(entry) if heap.is_marked(entry.owner) => false,
                    Some(entry) => {
                        entry.registry = None;
                        released += 1;
                        true
                    }
                    None => true,
                },
            );
        }

        let mut cleared = 0usize;
        weak.retain_entries(|_, target, id| {
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if trace {
                tracing::trace!(
                    target: "otter::reference",
                    entry = id.index(),
                    owner = %entry.owner,
                    referent = %target,
                    "checking weak reference"
                );
            }
            if !heap.is_marked(entry.owner) {
                entry.registry = None;
                released += 1;
                return false;
            }
            if heap.is_marked(target) {
                return true;
            }
            dereference(entry, id, notifications);
            cleared += 1;
            false
        });

        soft.retain_entries(|_, target, id| {
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if !heap.is_marked(entry.owner) {
                entry.registry = None;
                released += 1;
                return false;
            }
            if heap.is_marked(target) {
                return true;
            }
            dereference(entry, id, notifications);
            cleared += 1;
            false
        });

        // Only entries that survived the scan above feed the average.
        let arena: &EntryArena = entries;
        let decrement = pressure.decrement(
            soft.iter_entries()
                .filter_map(|id| arena.get(id))
                .map(|entry| entry.decay_remaining),
        );

        soft.retain_entries(|_, target, id| {
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            let exhausted = entry.decay(decrement);
            if trace {
                tracing::trace!(
                    target: "otter::reference",
                    entry = id.index(),
                    owner = %entry.owner,
                    referent = %target,
                    remaining = entry.decay_remaining,
                    decrement,
                    "soft reference decayed"
                );
            }
            if exhausted {
                dereference(entry, id, notifications);
                cleared += 1;
                return false;
            }
            true
        });

        *total_cleared += cleared as u64;

        tracing::debug!(
            target: "otter::reference",
            cleared,
            released,
            dead_classes,
            decrement,
            pending = notifications.len(),
            "references checked before sweep"
        );
    }

    fn finalize_reference(&mut self, id: EntryId) {
        let Some(entry) = self.entries.remove(id) else {
            return;
        };
        assert!(self.live_count > 0, "reference live count underflow");
        self.live_count -= 1;

        if let (Some(class), Some(target)) = (entry.registry, entry.target.as_object()) {
            self.registry_mut(entry.kind).unregister(class, target, id);
        }
        if entry.pending_notify {
            self.notifications.cancel(id);
        }

        if self.config.trace {
            tracing::trace!(
                target: "otter::reference",
                entry = id.index(),
                owner = %entry.owner,
                observers = entry.observers.len(),
                "reference finalized"
            );
        }
    }

    fn after_collection(&mut self, heap: &mut Heap) {
        let events = self.pressure.reset();
        if events > 0 {
            tracing::debug!(
                target: "otter::reference",
                events,
                decrement = self.pressure.last_decrement(),
                "memory pressure applied to soft references"
            );
        }

        let notified = self.drain_notifications(heap);
        self.collections += 1;

        tracing::debug!(
            target: "otter::reference",
            collection = self.collections,
            notified,
            live = self.live_count,
            weak_cached = self.weak.cached_count(),
            soft_cached = self.soft.cached_count(),
            "reference processing complete"
        );
    }
}

/// Entry id behind a weak or soft wrapper
fn entry_id(heap: &Heap, wrapper: ObjectId) -> RefResult<EntryId> {
    match heap.kind(wrapper) {
        Some(ObjectKind::Reference { entry, .. }) => Ok(*entry),
        Some(_) => Err(ReferenceError::NotAReference(wrapper)),
        None => Err(ReferenceError::Collected(wrapper)),
    }
}

fn reference_class_kind(heap: &Heap, class: ObjectId) -> RefResult<ReferenceKind> {
    match heap.kind(class) {
        Some(ObjectKind::Class(data)) => data
            .reference_kind
            .ok_or(ReferenceError::NotAReferenceClass(class)),
        Some(_) => Err(ReferenceError::NotAReferenceClass(class)),
        None => Err(ReferenceError::Collected(class)),
    }
}

fn ensure_queue(heap: &Heap, queue: ObjectId) -> RefResult<()> {
    match heap.kind(queue) {
        Some(ObjectKind::Queue(_)) => Ok(()),
        Some(_) => Err(ReferenceError::NotAQueue(queue)),
        None => Err(ReferenceError::Collected(queue)),
    }
}

/// Target of a weak wrapper, or `Nil` if the wrapper or its target is gone
fn resolve_weak(entries: &EntryArena, heap: &Heap, wrapper: ObjectId) -> Value {
    match heap.kind(wrapper) {
        Some(ObjectKind::Reference { entry, .. }) => {
            entries.get(*entry).map_or(Value::Nil, |entry| entry.target)
        }
        _ => Value::Nil,
    }
}

/// Clear an entry's target and queue it for notification if anyone observes
/// it. Returns false if it was already cleared.
fn dereference(entry: &mut ReferenceEntry, id: EntryId, notifications: &mut NotificationQueue) -> bool {
    entry.registry = None;
    if entry.target.is_nil() {
        return false;
    }
    entry.target = Value::Nil;
    entry.decay_ttl = 0;
    entry.decay_remaining = 0;
    entry.touched = false;
    if !entry.observers.is_empty() && !entry.pending_notify {
        entry.pending_notify = true;
        notifications.push(id);
    }
    true
}
