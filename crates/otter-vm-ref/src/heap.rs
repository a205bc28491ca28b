//! Host heap: stop-the-world mark/sweep collector
//!
//! This is the environment the reference subsystem plugs into. It provides
//! objects with stable identities, a persistent root set and a collection
//! cycle with four extension points:
//!
//! - **memory pressure**: events seen by the allocation path since the last
//!   collection are reported before marking starts
//! - **mark**: every live reference wrapper asks its hooks which extra
//!   objects it keeps alive
//! - **before sweep**: marking is complete, nothing has been reclaimed yet
//! - **after collection**: reclamation is finished
//!
//! Reclaimed reference wrappers are reported through
//! [`CollectionHooks::finalize_reference`] while the sweep runs.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::entry::{EntryId, ReferenceKind};
use crate::error::{RefResult, ReferenceError};
use crate::object::{GcHeader, MarkColor, ObjectId, Value, tags};
use crate::reference_queue::ReferenceQueue;

/// Host heap configuration
#[derive(Debug, Clone, Default)]
pub struct HeapConfig {
    /// Refuse allocations once this many objects are live (default: unlimited)
    pub max_objects: Option<usize>,
    /// Count a memory pressure event for every allocation made while at least
    /// this many objects are live (default: never)
    pub pressure_threshold: Option<usize>,
}

/// Collection phase
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    /// No collection in progress
    Idle = 0,
    /// Tracing from roots
    Marking = 1,
    /// Marking finished, sweep not started
    BeforeSweep = 2,
    /// Reclaiming unmarked objects
    Sweeping = 3,
    /// Reclamation finished
    AfterCollection = 4,
}

/// Class object payload
#[derive(Debug, Clone)]
pub struct ClassData {
    /// Class name
    pub name: String,
    /// Parent class, kept alive by the subclass
    pub superclass: Option<ObjectId>,
    /// Discipline of instances, for weak and soft reference classes
    pub reference_kind: Option<ReferenceKind>,
}

/// Heap object payload
#[derive(Debug)]
pub enum ObjectKind {
    /// Ordinary object holding strong value fields
    Plain {
        /// Field values
        fields: Vec<Value>,
    },
    /// Class object
    Class(ClassData),
    /// Weak or soft reference wrapper
    Reference {
        /// Wrapper class
        class: ObjectId,
        /// Backing entry owned by the reference subsystem
        entry: EntryId,
    },
    /// Reference wrapper that keeps its target alive
    HardReference {
        /// Referenced value
        target: Value,
    },
    /// Reference queue
    Queue(ReferenceQueue),
}

impl ObjectKind {
    fn tag(&self) -> u8 {
        match self {
            ObjectKind::Plain { .. } => tags::PLAIN,
            ObjectKind::Class(_) => tags::CLASS,
            ObjectKind::Reference { .. } => tags::REFERENCE,
            ObjectKind::HardReference { .. } => tags::HARD_REFERENCE,
            ObjectKind::Queue(_) => tags::QUEUE,
        }
    }

    /// Report strongly held children. Reference entries are traced
    /// separately through the collection hooks.
    fn trace(&self, tracer: &mut dyn FnMut(ObjectId)) {
        match self {
            ObjectKind::Plain { fields } => {
                for field in fields {
                    if let Some(child) = field.as_object() {
                        tracer(child);
                    }
                }
            }
            ObjectKind::Class(data) => {
                if let Some(superclass) = data.superclass {
                    tracer(superclass);
                }
            }
            ObjectKind::Reference { class, .. } => tracer(*class),
            ObjectKind::HardReference { target } => {
                if let Some(child) = target.as_object() {
                    tracer(child);
                }
            }
            ObjectKind::Queue(queue) => queue.trace(tracer),
        }
    }
}

/// One heap object
#[derive(Debug)]
pub struct HeapCell {
    header: GcHeader,
    kind: ObjectKind,
}

impl HeapCell {
    /// Object header
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    /// Object payload
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }
}

/// Extension points called by [`Heap::collect`]
pub trait CollectionHooks {
    /// Pressure events counted since the previous collection
    fn memory_pressure(&mut self, _events: usize) {}

    /// Report the objects kept alive by a live reference wrapper's entry
    fn trace_reference(&self, _entry: EntryId, _tracer: &mut dyn FnMut(ObjectId)) {}

    /// Marking is complete; marks can be queried through `heap`
    fn before_sweep(&mut self, _heap: &Heap) {}

    /// The wrapper owning `entry` has been reclaimed
    fn finalize_reference(&mut self, _entry: EntryId) {}

    /// The cycle is complete
    fn after_collection(&mut self, _heap: &mut Heap) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl CollectionHooks for NoHooks {}

/// Heap statistics
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    /// Number of live objects
    pub object_count: usize,
    /// Number of rooted objects
    pub root_count: usize,
    /// Total number of collections performed
    pub collection_count: usize,
    /// Objects reclaimed by the last collection
    pub last_reclaimed: usize,
    /// Pause time accumulated across all collections
    pub total_pause_time: Duration,
    /// Pause time of the last collection
    pub last_pause_time: Duration,
}

/// Host heap
#[derive(Debug)]
pub struct Heap {
    config: HeapConfig,
    cells: FxHashMap<ObjectId, HeapCell>,
    /// Root set with a count per object, so nested roots balance out
    roots: FxHashMap<ObjectId, usize>,
    next_id: u64,
    phase: GcPhase,
    pressure_events: usize,
    collection_count: usize,
    last_reclaimed: usize,
    total_pause: Duration,
    last_pause: Duration,
}

impl Heap {
    /// Create a heap with the default configuration
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with a custom configuration
    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            config,
            cells: FxHashMap::default(),
            roots: FxHashMap::default(),
            next_id: 1,
            phase: GcPhase::Idle,
            pressure_events: 0,
            collection_count: 0,
            last_reclaimed: 0,
            total_pause: Duration::ZERO,
            last_pause: Duration::ZERO,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Change the object limit
    pub fn set_max_objects(&mut self, max_objects: Option<usize>) {
        self.config.max_objects = max_objects;
    }

    /// Change the pressure threshold
    pub fn set_pressure_threshold(&mut self, threshold: Option<usize>) {
        self.config.pressure_threshold = threshold;
    }

    /// Allocate a new object.
    ///
    /// New objects are unrooted; they survive the next collection only if
    /// they are reachable from a root.
    pub fn allocate(&mut self, kind: ObjectKind) -> RefResult<ObjectId> {
        let live = self.cells.len();
        if let Some(limit) = self.config.max_objects {
            if live >= limit {
                return Err(ReferenceError::OutOfMemory { limit });
            }
        }
        if self
            .config
            .pressure_threshold
            .is_some_and(|threshold| live >= threshold)
        {
            self.pressure_events = self.pressure_events.saturating_add(1);
        }

        let id = ObjectId::from_bits(self.next_id);
        self.next_id += 1;
        self.cells.insert(
            id,
            HeapCell {
                header: GcHeader::new(kind.tag()),
                kind,
            },
        );
        Ok(id)
    }

    /// Allocate a plain object with the given fields
    pub fn alloc_plain(&mut self, fields: Vec<Value>) -> RefResult<ObjectId> {
        self.allocate(ObjectKind::Plain { fields })
    }

    /// Allocate a plain object with no fields
    pub fn alloc_object(&mut self) -> RefResult<ObjectId> {
        self.alloc_plain(Vec::new())
    }

    /// Allocate an empty reference queue
    pub fn alloc_queue(&mut self) -> RefResult<ObjectId> {
        self.allocate(ObjectKind::Queue(ReferenceQueue::new()))
    }

    /// Allocate a class object
    pub fn alloc_class(
        &mut self,
        name: impl Into<String>,
        superclass: Option<ObjectId>,
        reference_kind: Option<ReferenceKind>,
    ) -> RefResult<ObjectId> {
        self.allocate(ObjectKind::Class(ClassData {
            name: name.into(),
            superclass,
            reference_kind,
        }))
    }

    /// Read field `index` of a plain object
    pub fn field(&self, object: ObjectId, index: usize) -> Option<Value> {
        match self.kind(object)? {
            ObjectKind::Plain { fields } => fields.get(index).copied(),
            _ => None,
        }
    }

    /// Store into field `index` of a plain object, growing it with `Nil`.
    ///
    /// Returns false if `object` is not a live plain object.
    pub fn set_field(&mut self, object: ObjectId, index: usize, value: Value) -> bool {
        match self.kind_mut(object) {
            Some(ObjectKind::Plain { fields }) => {
                if fields.len() <= index {
                    fields.resize(index + 1, Value::Nil);
                }
                fields[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Add `object` to the root set
    pub fn add_root(&mut self, object: ObjectId) {
        *self.roots.entry(object).or_insert(0) += 1;
    }

    /// Drop one root registration of `object`
    pub fn remove_root(&mut self, object: ObjectId) -> bool {
        match self.roots.get_mut(&object) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.roots.remove(&object);
                true
            }
            None => false,
        }
    }

    /// Returns true if `object` is in the root set
    pub fn is_root(&self, object: ObjectId) -> bool {
        self.roots.contains_key(&object)
    }

    /// Returns true if `object` has not been reclaimed
    pub fn contains(&self, object: ObjectId) -> bool {
        self.cells.contains_key(&object)
    }

    /// Look up a live object
    pub fn get(&self, object: ObjectId) -> Option<&HeapCell> {
        self.cells.get(&object)
    }

    /// Payload of a live object
    pub fn kind(&self, object: ObjectId) -> Option<&ObjectKind> {
        self.cells.get(&object).map(|cell| &cell.kind)
    }

    /// Mutable payload of a live object
    pub fn kind_mut(&mut self, object: ObjectId) -> Option<&mut ObjectKind> {
        self.cells.get_mut(&object).map(|cell| &mut cell.kind)
    }

    /// Class payload, if `object` is a live class
    pub fn class(&self, object: ObjectId) -> Option<&ClassData> {
        match self.kind(object)? {
            ObjectKind::Class(data) => Some(data),
            _ => None,
        }
    }

    /// Queue payload, if `object` is a live reference queue
    pub fn queue(&self, object: ObjectId) -> Option<&ReferenceQueue> {
        match self.kind(object)? {
            ObjectKind::Queue(queue) => Some(queue),
            _ => None,
        }
    }

    /// Mutable queue payload
    pub fn queue_mut(&mut self, object: ObjectId) -> Option<&mut ReferenceQueue> {
        match self.kind_mut(object)? {
            ObjectKind::Queue(queue) => Some(queue),
            _ => None,
        }
    }

    /// Returns true if `object` was reached by the last mark phase.
    ///
    /// Only meaningful between marking and sweeping.
    pub fn is_marked(&self, object: ObjectId) -> bool {
        self.cells
            .get(&object)
            .is_some_and(|cell| cell.header.mark() == MarkColor::Black)
    }

    /// Like [`is_marked`](Self::is_marked); immediates are always live
    pub fn is_value_marked(&self, value: Value) -> bool {
        value.as_object().is_none_or(|object| self.is_marked(object))
    }

    /// Current collection phase
    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.cells.len()
    }

    /// Pressure events waiting to be reported to the next collection
    pub fn pressure_events(&self) -> usize {
        self.pressure_events
    }

    /// Report one memory pressure event from outside the allocation path
    pub fn record_pressure(&mut self) {
        self.pressure_events = self.pressure_events.saturating_add(1);
    }

    /// Get collection statistics
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            object_count: self.cells.len(),
            root_count: self.roots.len(),
            collection_count: self.collection_count,
            last_reclaimed: self.last_reclaimed,
            total_pause_time: self.total_pause,
            last_pause_time: self.last_pause,
        }
    }

    /// Perform a full mark/sweep collection; returns the number of objects
    /// reclaimed
    pub fn collect(&mut self, hooks: &mut dyn CollectionHooks) -> usize {
        let start = Instant::now();
        let initial_count = self.cells.len();

        tracing::debug!(
            target: "otter::gc",
            roots = self.roots.len(),
            objects = initial_count,
            pressure_events = self.pressure_events,
            "GC cycle starting"
        );

        let events = std::mem::take(&mut self.pressure_events);
        if events > 0 {
            hooks.memory_pressure(events);
        }

        // Phase 1: Reset all marks to white
        self.reset_marks();

        // Phase 2: Mark from roots
        self.phase = GcPhase::Marking;
        self.mark(&*hooks);

        // Phase 3: Let the hooks inspect marks before anything is freed
        self.phase = GcPhase::BeforeSweep;
        hooks.before_sweep(self);

        // Phase 4: Sweep unmarked objects
        self.phase = GcPhase::Sweeping;
        let reclaimed = self.sweep(hooks);

        self.phase = GcPhase::AfterCollection;
        hooks.after_collection(self);
        self.phase = GcPhase::Idle;

        let elapsed = start.elapsed();
        self.collection_count += 1;
        self.last_reclaimed = reclaimed;
        self.total_pause += elapsed;
        self.last_pause = elapsed;

        tracing::info!(
            target: "otter::gc",
            collection = self.collection_count,
            reclaimed_objects = reclaimed,
            pause_us = elapsed.as_micros() as u64,
            live_objects = self.cells.len(),
            "GC cycle complete"
        );

        reclaimed
    }

    fn reset_marks(&self) {
        for cell in self.cells.values() {
            cell.header.set_mark(MarkColor::White);
        }
    }

    /// Mark phase: trace from roots and mark all reachable objects
    fn mark(&self, hooks: &dyn CollectionHooks) {
        let mut worklist: Vec<ObjectId> = Vec::new();

        for root in self.roots.keys() {
            shade(&self.cells, *root, &mut worklist);
        }

        while let Some(object) = worklist.pop() {
            let Some(cell) = self.cells.get(&object) else {
                continue;
            };
            if cell.header.mark() == MarkColor::Black {
                continue;
            }

            let mut visit = |child: ObjectId| shade(&self.cells, child, &mut worklist);
            cell.kind.trace(&mut visit);
            if let ObjectKind::Reference { entry, .. } = cell.kind {
                hooks.trace_reference(entry, &mut visit);
            }

            cell.header.set_mark(MarkColor::Black);
        }
    }

    /// Sweep phase: free all white (unreachable) objects
    fn sweep(&mut self, hooks: &mut dyn CollectionHooks) -> usize {
        let mut dead: Vec<ObjectId> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.header.mark() == MarkColor::White)
            .map(|(id, _)| *id)
            .collect();
        dead.sort_unstable();

        for object in &dead {
            if let Some(cell) = self.cells.remove(object) {
                if let ObjectKind::Reference { entry, .. } = cell.kind {
                    hooks.finalize_reference(entry);
                }
            }
        }

        dead.len()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Gray a white object and queue it for scanning
fn shade(cells: &FxHashMap<ObjectId, HeapCell>, object: ObjectId, worklist: &mut Vec<ObjectId>) {
    if let Some(cell) = cells.get(&object) {
        if cell.header.mark() == MarkColor::White {
            cell.header.set_mark(MarkColor::Gray);
            worklist.push(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHooks {
        pressure: Vec<usize>,
        phases: Vec<GcPhase>,
        finalized: Vec<EntryId>,
        extra_edge: Option<(EntryId, ObjectId)>,
    }

    impl CollectionHooks for RecordingHooks {
        fn memory_pressure(&mut self, events: usize) {
            self.pressure.push(events);
        }

        fn trace_reference(&self, entry: EntryId, tracer: &mut dyn FnMut(ObjectId)) {
            if let Some((edge_entry, target)) = self.extra_edge {
                if edge_entry == entry {
                    tracer(target);
                }
            }
        }

        fn before_sweep(&mut self, heap: &Heap) {
            self.phases.push(heap.phase());
        }

        fn finalize_reference(&mut self, entry: EntryId) {
            self.finalized.push(entry);
        }

        fn after_collection(&mut self, heap: &mut Heap) {
            self.phases.push(heap.phase());
        }
    }

    #[test]
    fn test_collect_empty() {
        let mut heap = Heap::new();
        let reclaimed = heap.collect(&mut NoHooks);
        assert_eq!(reclaimed, 0);
        assert_eq!(heap.stats().collection_count, 1);
        assert_eq!(heap.phase(), GcPhase::Idle);
    }

    #[test]
    fn test_collect_unreachable() {
        let mut heap = Heap::new();
        heap.alloc_object().unwrap();
        heap.alloc_object().unwrap();
        assert_eq!(heap.object_count(), 2);

        assert_eq!(heap.collect(&mut NoHooks), 2);
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.stats().last_reclaimed, 2);
    }

    #[test]
    fn test_roots_and_fields_keep_objects() {
        let mut heap = Heap::new();
        let leaf = heap.alloc_object().unwrap();
        let root = heap.alloc_plain(vec![Value::Int(1), leaf.into()]).unwrap();
        let garbage = heap.alloc_object().unwrap();
        heap.add_root(root);

        assert_eq!(heap.collect(&mut NoHooks), 1);
        assert!(heap.contains(root));
        assert!(heap.contains(leaf));
        assert!(!heap.contains(garbage));
        assert_eq!(heap.field(root, 0), Some(Value::Int(1)));
    }

    #[test]
    fn test_collects_cycles() {
        let mut heap = Heap::new();
        let a = heap.alloc_object().unwrap();
        let b = heap.alloc_plain(vec![a.into()]).unwrap();
        assert!(heap.set_field(a, 0, b.into()));

        assert_eq!(heap.collect(&mut NoHooks), 2);
    }

    #[test]
    fn test_nested_roots_balance() {
        let mut heap = Heap::new();
        let obj = heap.alloc_object().unwrap();
        heap.add_root(obj);
        heap.add_root(obj);

        assert!(heap.remove_root(obj));
        heap.collect(&mut NoHooks);
        assert!(heap.contains(obj));

        assert!(heap.remove_root(obj));
        assert!(!heap.remove_root(obj));
        heap.collect(&mut NoHooks);
        assert!(!heap.contains(obj));
    }

    #[test]
    fn test_object_limit() {
        let mut heap = Heap::with_config(HeapConfig {
            max_objects: Some(1),
            ..HeapConfig::default()
        });
        heap.alloc_object().unwrap();
        let err = heap.alloc_object().unwrap_err();
        assert!(matches!(err, ReferenceError::OutOfMemory { limit: 1 }));
    }

    #[test]
    fn test_pressure_reported_at_collection_start() {
        let mut heap = Heap::with_config(HeapConfig {
            pressure_threshold: Some(2),
            ..HeapConfig::default()
        });
        for _ in 0..5 {
            heap.alloc_object().unwrap();
        }
        assert_eq!(heap.pressure_events(), 3);

        let mut hooks = RecordingHooks::default();
        heap.collect(&mut hooks);
        heap.collect(&mut hooks);
        assert_eq!(hooks.pressure, vec![3]);
        assert_eq!(heap.pressure_events(), 0);
    }

    #[test]
    fn test_hooks_run_in_phase_order() {
        let mut heap = Heap::new();
        let mut hooks = RecordingHooks::default();
        heap.collect(&mut hooks);
        assert_eq!(
            hooks.phases,
            vec![GcPhase::BeforeSweep, GcPhase::AfterCollection]
        );
    }

    #[test]
    fn test_reference_tracing_and_finalization() {
        let mut heap = Heap::new();
        let class = heap.alloc_class("Ref", None, Some(ReferenceKind::Weak)).unwrap();
        let target = heap.alloc_object().unwrap();
        let kept = heap
            .allocate(ObjectKind::Reference {
                class,
                entry: EntryId::new(0),
            })
            .unwrap();
        heap.allocate(ObjectKind::Reference {
            class,
            entry: EntryId::new(1),
        })
        .unwrap();
        heap.add_root(kept);

        let mut hooks = RecordingHooks {
            extra_edge: Some((EntryId::new(0), target)),
            ..RecordingHooks::default()
        };
        heap.collect(&mut hooks);

        assert!(heap.contains(class));
        assert!(heap.contains(target));
        assert_eq!(hooks.finalized, vec![EntryId::new(1)]);
    }

    #[test]
    fn test_immediates_count_as_marked() {
        let heap = Heap::new();
        assert!(heap.is_value_marked(Value::Int(5)));
        assert!(heap.is_value_marked(Value::Nil));
        assert!(!heap.is_value_marked(Value::Object(ObjectId::from_bits(99))));
    }
}
