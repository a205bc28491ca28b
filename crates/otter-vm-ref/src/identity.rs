//! Identity-keyed tables
//!
//! Keys are compared by object identity only: two distinct objects with equal
//! contents are different keys. The hash is derived from the identity bits,
//! never from object contents, so a table can be consulted during a
//! collection without touching the objects themselves.

use crate::object::ObjectId;
use rustc_hash::FxHashMap;
use std::collections::TryReserveError;

/// Hash table keyed by object identity
pub struct IdentityTable<V> {
    entries: FxHashMap<ObjectId, V>,
}

impl<V> IdentityTable<V> {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Look up the value filed under `key`
    pub fn lookup(&self, key: ObjectId) -> Option<&V> {
        self.entries.get(&key)
    }

    /// Mutable lookup
    pub fn lookup_mut(&mut self, key: ObjectId) -> Option<&mut V> {
        self.entries.get_mut(&key)
    }

    /// Returns true if `key` is present
    pub fn contains(&self, key: ObjectId) -> bool {
        self.entries.contains_key(&key)
    }

    /// Insert or replace; returns the previous value
    pub fn insert(&mut self, key: ObjectId, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Value filed under `key`, inserting `make()` first if absent
    pub fn get_or_insert_with(&mut self, key: ObjectId, make: impl FnOnce() -> V) -> &mut V {
        self.entries.entry(key).or_insert_with(make)
    }

    /// Remove `key`; returns the removed value
    pub fn delete(&mut self, key: ObjectId) -> Option<V> {
        self.entries.remove(&key)
    }

    /// Reserve room for `additional` inserts without reallocating
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.entries.try_reserve(additional)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visit every row
    pub fn for_each(&self, mut visitor: impl FnMut(ObjectId, &V)) {
        for (key, value) in &self.entries {
            visitor(*key, value);
        }
    }

    /// Iterate over rows
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &V)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    /// Iterate mutably over rows
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut V)> + '_ {
        self.entries.iter_mut().map(|(key, value)| (*key, value))
    }

    /// Iterate over values
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.values()
    }

    /// Visit every row, deleting the rows for which `keep` returns false.
    ///
    /// Returns the number of deleted rows.
    pub fn retain(&mut self, mut keep: impl FnMut(ObjectId, &mut V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, value| keep(*key, value));
        before - self.entries.len()
    }
}

impl<V> Default for IdentityTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for IdentityTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityTable")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(bits: u64) -> ObjectId {
        ObjectId::from_bits(bits)
    }

    #[test]
    fn test_insert_lookup_delete() {
        let mut table = IdentityTable::new();
        assert!(table.is_empty());

        assert_eq!(table.insert(id(1), "a"), None);
        assert_eq!(table.insert(id(2), "b"), None);
        assert_eq!(table.lookup(id(1)), Some(&"a"));
        assert_eq!(table.len(), 2);

        assert_eq!(table.insert(id(1), "c"), Some("a"));
        assert_eq!(table.delete(id(1)), Some("c"));
        assert_eq!(table.delete(id(1)), None);
        assert!(!table.contains(id(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_retain_counts_deleted_rows() {
        let mut table = IdentityTable::new();
        for i in 0..10 {
            table.insert(id(i), i);
        }

        let removed = table.retain(|_, value| *value % 2 == 0);
        assert_eq!(removed, 5);
        assert_eq!(table.len(), 5);

        let mut sum = 0;
        table.for_each(|_, value| sum += value);
        assert_eq!(sum, 2 + 4 + 6 + 8);
    }

    #[test]
    fn test_try_reserve() {
        let mut table: IdentityTable<u32> = IdentityTable::new();
        assert!(table.try_reserve(16).is_ok());
        assert!(table.is_empty());
    }
}
