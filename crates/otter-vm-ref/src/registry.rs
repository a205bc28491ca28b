//! Class-scoped reference registries
//!
//! Each reference class (the base weak/soft classes and every subclass) owns
//! a private table of `target → entry`. Rows are created lazily on first use
//! and dropped before sweep once their class is unreachable.

use crate::entry::{EntryId, ReferenceKind};
use crate::identity::IdentityTable;
use crate::object::ObjectId;

/// Per-class table of cached entries
pub type ClassTable = IdentityTable<EntryId>;

/// Registry of class rows for one reference discipline
#[derive(Debug)]
pub struct ClassRegistry {
    kind: ReferenceKind,
    classes: IdentityTable<ClassTable>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new(kind: ReferenceKind) -> Self {
        Self {
            kind,
            classes: IdentityTable::new(),
        }
    }

    /// Discipline of the entries filed here
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Table for `class`, creating the row on first use
    pub fn table_for_class(&mut self, class: ObjectId) -> &mut ClassTable {
        self.classes.get_or_insert_with(class, ClassTable::new)
    }

    /// Table for `class`, if the row exists
    pub fn table(&self, class: ObjectId) -> Option<&ClassTable> {
        self.classes.lookup(class)
    }

    /// Mutable table for `class`, if the row exists
    pub fn table_mut(&mut self, class: ObjectId) -> Option<&mut ClassTable> {
        self.classes.lookup_mut(class)
    }

    /// Cached entry for `(class, target)`
    pub fn lookup(&self, class: ObjectId, target: ObjectId) -> Option<EntryId> {
        self.classes.lookup(class)?.lookup(target).copied()
    }

    /// Remove `(class, target)` if it is filed as `entry`.
    ///
    /// Returns false when the row or key is missing, which happens when the
    /// entry was already dropped by a sweep.
    pub fn unregister(&mut self, class: ObjectId, target: ObjectId, entry: EntryId) -> bool {
        let Some(table) = self.classes.lookup_mut(class) else {
            return false;
        };
        if table.lookup(target) == Some(&entry) {
            table.delete(target);
            true
        } else {
            false
        }
    }

    /// Number of class rows
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of cached entries across all classes
    pub fn cached_count(&self) -> usize {
        self.classes.values().map(|table| table.len()).sum()
    }

    /// Iterate over every cached entry id
    pub fn iter_entries(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.classes
            .values()
            .flat_map(|table| table.values().copied())
    }

    /// Every cached entry id
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.iter_entries().collect()
    }

    /// Drop the row of `class` if it holds no entries
    pub fn remove_empty_row(&mut self, class: ObjectId) -> bool {
        if self.classes.lookup(class).is_some_and(|table| table.is_empty()) {
            self.classes.delete(class);
            true
        } else {
            false
        }
    }

    /// Visit every class table, deleting rows for which `keep` returns false
    pub fn retain_entries(
        &mut self,
        mut keep: impl FnMut(ObjectId, ObjectId, EntryId) -> bool,
    ) -> usize {
        let mut removed = 0;
        for (class, table) in self.classes.iter_mut() {
            removed += table.retain(|target, entry| keep(class, target, *entry));
        }
        removed
    }

    /// Drop the rows of unreachable classes.
    ///
    /// Entries whose own wrapper is unreachable are silently unregistered
    /// first through `release`. Any entry still left in a dead class's table
    /// has a live wrapper, and a live wrapper keeps its class alive, so that
    /// case is a broken collector contract and aborts.
    pub fn remove_dead_classes(
        &mut self,
        is_marked: impl Fn(ObjectId) -> bool,
        mut release: impl FnMut(EntryId) -> bool,
    ) -> usize {
        self.classes.retain(|class, table| {
            if is_marked(class) {
                return true;
            }
            table.retain(|_, entry| !release(*entry));
            assert!(
                table.is_empty(),
                "dead reference class {class} still has {} live entries",
                table.len()
            );
            false
        })
    }
}
