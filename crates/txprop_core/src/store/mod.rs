//! Durable store seam.
//!
//! The store is where committed writes become visible. It is an external
//! collaborator: the manager only ever calls [`DurableStore::commit`] for a
//! context that has been decided committed, or for a single auto-commit
//! write issued outside any transaction. Once `commit` returns there is no
//! way to take the writes back.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - committed entities plus an ordered commit log

mod memory;

pub use memory::{CommitRecord, InMemoryStore};

use crate::transaction::WriteRecord;
use crate::types::{ContextId, EntityKey, SequenceNumber};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a durable store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store cannot accept commits right now.
    #[error("store is unavailable")]
    Unavailable,

    /// The store refused the batch.
    #[error("commit rejected: {message}")]
    Rejected {
        /// Why the batch was rejected.
        message: String,
    },
}

/// A store that makes committed writes durable.
///
/// # Invariants
///
/// - `commit` applies the whole batch or nothing
/// - writes are applied in the order given
/// - sequence numbers returned by `commit` strictly increase
/// - stores must be `Send + Sync` so one manager can serve many threads
pub trait DurableStore: Send + Sync {
    /// Makes `writes` durable on behalf of `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be applied; in that case
    /// none of it is visible.
    fn commit(&self, context: ContextId, writes: &[WriteRecord]) -> StoreResult<SequenceNumber>;

    /// Reads the committed payload for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn read(&self, key: &EntityKey) -> StoreResult<Option<Vec<u8>>>;
}
