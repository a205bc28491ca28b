//! Reference subsystem error types

use crate::object::ObjectId;
use std::collections::TryReserveError;
use thiserror::Error;

/// Errors surfaced by reference creation and handle accessors
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// The host heap refused to allocate another object
    #[error("OutOfMemory: heap object limit of {limit} reached")]
    OutOfMemory {
        /// Configured object limit
        limit: usize,
    },

    /// Growing a reference table failed
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// Every entry index is in use
    #[error("reference entry limit reached")]
    EntryLimit,

    /// The handle does not name a reference wrapper
    #[error("{0} is not a reference")]
    NotAReference(ObjectId),

    /// The handle does not name a weak or soft reference class
    #[error("{0} is not a reference class")]
    NotAReferenceClass(ObjectId),

    /// The handle does not name a reference queue
    #[error("{0} is not a reference queue")]
    NotAQueue(ObjectId),

    /// A soft-only accessor was used on another kind of reference
    #[error("{0} is not a soft reference")]
    NotSoft(ObjectId),

    /// The handle names an object that has already been reclaimed
    #[error("{0} has been collected")]
    Collected(ObjectId),
}

/// Result alias used throughout the crate
pub type RefResult<T> = Result<T, ReferenceError>;
