//! # Otter VM References
//!
//! Weak and soft references with reference queues, cooperating with a
//! tracing collector.
//!
//! ## Design
//!
//! - **Weak references**: cleared as soon as the target is otherwise unreachable
//! - **Soft references**: keep the target alive for a decaying number of
//!   collections, refreshed on access and shortened under memory pressure
//! - **Class-scoped caches**: one wrapper per live `(class, target)` pair
//! - **Reference queues**: cleared wrappers are delivered once per collection
//! - **Host heap**: a stop-the-world mark/sweep heap driving the subsystem
//!   through [`CollectionHooks`]

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod entry;
pub mod error;
pub mod heap;
pub mod identity;
pub mod notify;
pub mod object;
pub mod pressure;
pub mod reference;
pub mod reference_queue;
pub mod registry;
pub mod weak_key_map;

pub use config::ReferenceConfig;
pub use entry::{EntryId, ReferenceEntry, ReferenceKind};
pub use error::{RefResult, ReferenceError};
pub use heap::{CollectionHooks, GcPhase, Heap, HeapConfig, HeapStats, NoHooks, ObjectKind};
pub use object::{ObjectId, Value};
pub use reference::{ReferenceStats, ReferenceSystem};
pub use reference_queue::ReferenceQueue;
pub use weak_key_map::WeakKeyMap;
