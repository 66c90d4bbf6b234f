//! # txprop Testkit
//!
//! Test utilities for txprop.
//!
//! This crate provides:
//! - A test harness pairing a manager with an inspectable in-memory store
//! - Property-based generators for propagation modes and random call plans
//! - The scenario catalog: end-to-end order-processing call chains with
//!   their resulting durable state
//!
//! ## Usage
//!
//! ```rust
//! use txprop_testkit::prelude::*;
//!
//! let harness = TestHarness::new();
//! harness
//!     .run(Propagation::Required, |scope| scope.put(keys::order(1), "NEW"))
//!     .unwrap();
//! assert_eq!(harness.entity(&keys::order(1)).as_deref(), Some("NEW"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenarios;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scenarios::{catalog, find, Scenario, ScenarioOutcome, ScenarioReport};
    pub use txprop_core::{
        EntityKey, ManagerConfig, NestedStrategy, Propagation, PropagationError,
        PropagationResult, Scope,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use scenarios::{catalog, find, Scenario, ScenarioOutcome, ScenarioReport};
