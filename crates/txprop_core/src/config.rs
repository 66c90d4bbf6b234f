//! Transaction manager configuration.

use serde::Serialize;

/// How `NESTED` behaves when an ambient context exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NestedStrategy {
    /// Child context backed by a savepoint in the parent.
    #[default]
    Savepoint,
    /// Suspend the parent and run an independent context, like `REQUIRES_NEW`.
    Independent,
}

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone, Serialize)]
pub struct ManagerConfig {
    /// Whether a failed participant marks the joined context rollback-only.
    pub rollback_on_participation_failure: bool,

    /// Whether completing a context that a failed participant doomed
    /// returns `UnexpectedRollback` instead of the body's value.
    pub fail_on_unexpected_rollback: bool,

    /// Behavior of `NESTED` inside an existing context.
    pub nested_strategy: NestedStrategy,

    /// Maximum depth of operation frames (top-level call is depth 1).
    pub max_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            rollback_on_participation_failure: true,
            fail_on_unexpected_rollback: true,
            nested_strategy: NestedStrategy::Savepoint,
            max_depth: 64,
        }
    }
}

impl ManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a failed participant dooms the joined context.
    #[must_use]
    pub const fn rollback_on_participation_failure(mut self, value: bool) -> Self {
        self.rollback_on_participation_failure = value;
        self
    }

    /// Sets whether an unexpected rollback is reported as an error.
    #[must_use]
    pub const fn fail_on_unexpected_rollback(mut self, value: bool) -> Self {
        self.fail_on_unexpected_rollback = value;
        self
    }

    /// Sets the nested strategy.
    #[must_use]
    pub const fn nested_strategy(mut self, strategy: NestedStrategy) -> Self {
        self.nested_strategy = strategy;
        self
    }

    /// Sets the maximum frame depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
