//! Object identity and header layout

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Stable identity of a heap object.
///
/// Identities are never reused by the host heap, so comparing two ids is the
/// same as comparing two object addresses that never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw identity bits (used as the hash by identity tables)
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value that can be stored in object fields or referenced.
///
/// Only `Object` has an identity. The other variants are immediates: they
/// have no address, cannot be collected and are never cached by reference
/// tables. `Nil` doubles as the empty sentinel of a cleared reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Value {
    /// The empty value
    #[default]
    Nil,
    /// Boolean immediate
    Bool(bool),
    /// Integer immediate
    Int(i64),
    /// Heap object
    Object(ObjectId),
}

impl Value {
    /// Returns true for the empty sentinel
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true if the value has no identity
    pub fn is_immediate(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    /// Object identity, if the value is a heap object
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

/// GC object header
#[repr(C)]
pub struct GcHeader {
    /// Mark bits for tri-color marking
    mark: AtomicU8,
    /// Object type tag
    tag: u8,
}

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

impl GcHeader {
    /// Create new header
    pub const fn new(tag: u8) -> Self {
        Self {
            mark: AtomicU8::new(MarkColor::White as u8),
            tag,
        }
    }

    /// Get mark color
    pub fn mark(&self) -> MarkColor {
        match self.mark.load(Ordering::Acquire) {
            0 => MarkColor::White,
            1 => MarkColor::Gray,
            _ => MarkColor::Black,
        }
    }

    /// Set mark color
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.store(color as u8, Ordering::Release);
    }

    /// Get object tag
    pub fn tag(&self) -> u8 {
        self.tag
    }
}

impl fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcHeader")
            .field("mark", &self.mark())
            .field("tag", &self.tag)
            .finish()
    }
}

/// Object type tags
pub mod tags {
    /// Plain object with value fields
    pub const PLAIN: u8 = 1;
    /// Class object
    pub const CLASS: u8 = 2;
    /// Weak or soft reference wrapper
    pub const REFERENCE: u8 = 3;
    /// Hard reference wrapper
    pub const HARD_REFERENCE: u8 = 4;
    /// Reference queue
    pub const QUEUE: u8 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_marking() {
        let header = GcHeader::new(tags::PLAIN);
        assert_eq!(header.mark(), MarkColor::White);

        header.set_mark(MarkColor::Gray);
        assert_eq!(header.mark(), MarkColor::Gray);

        header.set_mark(MarkColor::Black);
        assert_eq!(header.mark(), MarkColor::Black);
        assert_eq!(header.tag(), tags::PLAIN);
    }

    #[test]
    fn test_value_immediates() {
        assert!(Value::Nil.is_immediate());
        assert!(Value::Int(3).is_immediate());
        assert!(Value::Bool(false).is_immediate());

        let obj = Value::from(ObjectId::from_bits(7));
        assert!(!obj.is_immediate());
        assert_eq!(obj.as_object(), Some(ObjectId::from_bits(7)));
        assert_eq!(Value::Int(3).as_object(), None);
    }
}
