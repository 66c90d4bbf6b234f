//! # txprop Core
//!
//! Transaction propagation engine.
//!
//! This crate provides:
//! - The seven propagation modes and a pure policy resolver
//! - Transaction contexts with write buffering and rollback-only marking
//! - Savepoint-backed nested contexts
//! - A transaction manager that runs operation bodies under a mode
//! - A durable store seam with an in-memory implementation
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use txprop_core::{EntityKey, InMemoryStore, Propagation, TransactionManager};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let tm = TransactionManager::new(store.clone());
//!
//! tm.run(Propagation::Required, |scope| {
//!     scope.put(EntityKey::new("order", "1"), "PROCESSING")?;
//!     scope.run(Propagation::Mandatory, |scope| {
//!         scope.put(EntityKey::new("sales_report", "1"), "recorded")
//!     })
//! })
//! .unwrap();
//!
//! assert_eq!(store.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod propagation;
mod stats;
mod store;
mod transaction;
mod types;

pub use config::{ManagerConfig, NestedStrategy};
pub use error::{OperationFailure, PropagationError, PropagationResult};
pub use propagation::{
    resolve, Completion, CompletionRule, Outcome, ParsePropagationError, Propagation, Transition,
};
pub use stats::{ManagerStats, StatsSnapshot};
pub use store::{CommitRecord, DurableStore, InMemoryStore, StoreError, StoreResult};
pub use transaction::{
    ContextState, PendingWrite, RollbackCause, Scope, TransactionContext, TransactionManager,
    WriteRecord,
};
pub use types::{ContextId, EntityKey, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
