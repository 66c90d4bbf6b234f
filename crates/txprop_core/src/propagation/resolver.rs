//! Policy resolution.
//!
//! Maps a requested mode and the ambient context (if any) to the transition
//! the manager must perform before running an operation body, and maps the
//! body's outcome to what must happen afterwards. Both halves are pure data
//! so they can be tested, and printed, without running anything.

use crate::config::NestedStrategy;
use crate::error::{PropagationError, PropagationResult};
use crate::propagation::Propagation;
use crate::types::ContextId;
use serde::Serialize;
use std::fmt;

/// Context transition performed before an operation body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    /// Reuse the ambient context.
    Join {
        /// The ambient context being joined.
        context: ContextId,
    },
    /// Begin a new top-level context.
    Begin,
    /// Suspend the ambient context and begin an independent one.
    SuspendAndBegin {
        /// The context suspended for the duration of the call.
        suspended: ContextId,
    },
    /// Begin a child context whose parent acts as a savepoint.
    Nest {
        /// The enclosing context.
        parent: ContextId,
    },
    /// Run without any context.
    RunDetached,
    /// Suspend the ambient context and run without any context.
    SuspendAndRunDetached {
        /// The context suspended for the duration of the call.
        suspended: ContextId,
    },
}

impl Transition {
    /// Returns the rule applied once the body has run.
    #[must_use]
    pub const fn completion_rule(self) -> CompletionRule {
        match self {
            Transition::Join { .. } => CompletionRule::Participate,
            Transition::Begin | Transition::SuspendAndBegin { .. } => {
                CompletionRule::CommitOrRollback
            }
            Transition::Nest { .. } => CompletionRule::ReleaseOrRollbackToSavepoint,
            Transition::RunDetached | Transition::SuspendAndRunDetached { .. } => {
                CompletionRule::AutoCommit
            }
        }
    }

    /// Returns the context suspended by this transition, if any.
    #[must_use]
    pub const fn suspended(self) -> Option<ContextId> {
        match self {
            Transition::SuspendAndBegin { suspended }
            | Transition::SuspendAndRunDetached { suspended } => Some(suspended),
            _ => None,
        }
    }

    /// Returns true if the body will run with a transaction context.
    #[must_use]
    pub const fn is_transactional(self) -> bool {
        !matches!(
            self,
            Transition::RunDetached | Transition::SuspendAndRunDetached { .. }
        )
    }

    /// Applies the nested strategy.
    ///
    /// With [`NestedStrategy::Independent`] a nest becomes a suspend-and-begin.
    #[must_use]
    pub const fn with_nested_strategy(self, strategy: NestedStrategy) -> Self {
        match (self, strategy) {
            (Transition::Nest { parent }, NestedStrategy::Independent) => {
                Transition::SuspendAndBegin { suspended: parent }
            }
            (transition, _) => transition,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Join { .. } => f.write_str("join ambient"),
            Transition::Begin => f.write_str("create new context"),
            Transition::SuspendAndBegin { .. } => f.write_str("suspend ambient, create new"),
            Transition::Nest { .. } => f.write_str("create child context (savepoint)"),
            Transition::RunDetached => f.write_str("run with no context"),
            Transition::SuspendAndRunDetached { .. } => {
                f.write_str("suspend ambient, run with no context")
            }
        }
    }
}

/// Resolves the transition for `mode` given the ambient context.
///
/// `MANDATORY` without an ambient context and `NEVER` with one are
/// rejected here, before any body runs.
pub fn resolve(mode: Propagation, ambient: Option<ContextId>) -> PropagationResult<Transition> {
    let transition = match (mode, ambient) {
        (Propagation::Required, None) => Transition::Begin,
        (Propagation::Required, Some(context)) => Transition::Join { context },

        (Propagation::RequiresNew, None) => Transition::Begin,
        (Propagation::RequiresNew, Some(suspended)) => Transition::SuspendAndBegin { suspended },

        (Propagation::Supports, None) => Transition::RunDetached,
        (Propagation::Supports, Some(context)) => Transition::Join { context },

        (Propagation::NotSupported, None) => Transition::RunDetached,
        (Propagation::NotSupported, Some(suspended)) => {
            Transition::SuspendAndRunDetached { suspended }
        }

        (Propagation::Mandatory, None) => return Err(PropagationError::NoTransaction { mode }),
        (Propagation::Mandatory, Some(context)) => Transition::Join { context },

        (Propagation::Never, None) => Transition::RunDetached,
        (Propagation::Never, Some(context)) => {
            return Err(PropagationError::ExistingTransaction { mode, context })
        }

        (Propagation::Nested, None) => Transition::Begin,
        (Propagation::Nested, Some(parent)) => Transition::Nest { parent },
    };
    Ok(transition)
}

/// How a frame is completed once its body has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionRule {
    /// The frame joined someone else's context; the owner decides later.
    Participate,
    /// The frame owns an independent context.
    CommitOrRollback,
    /// The frame owns a child context backed by a savepoint in its parent.
    ReleaseOrRollbackToSavepoint,
    /// The frame ran without a context; writes were already committed.
    AutoCommit,
}

/// Result of running a body, as seen by the completion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// The body returned an error.
    pub failed: bool,
    /// The frame's context was marked rollback-only.
    pub rollback_only: bool,
}

impl Outcome {
    /// Outcome of a body that returned `Ok`.
    #[must_use]
    pub const fn succeeded(rollback_only: bool) -> Self {
        Self {
            failed: false,
            rollback_only,
        }
    }

    /// Outcome of a body that returned `Err`.
    #[must_use]
    pub const fn failed(rollback_only: bool) -> Self {
        Self {
            failed: true,
            rollback_only,
        }
    }
}

/// Action taken on a frame's context after its body has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    /// Leave the context alone.
    Nothing,
    /// Doom the joined context; its owner will roll it back.
    MarkRollbackOnly,
    /// Make the buffered writes durable.
    Commit,
    /// Discard the buffered writes.
    Rollback,
    /// Hand the child's writes to its parent as pending work.
    ReleaseIntoParent,
    /// Discard the child's writes; the parent is untouched.
    RollbackToSavepoint,
}

impl CompletionRule {
    /// Decides the completion for an outcome.
    #[must_use]
    pub const fn decide(self, outcome: Outcome) -> Completion {
        match self {
            CompletionRule::Participate => {
                if outcome.failed {
                    Completion::MarkRollbackOnly
                } else {
                    Completion::Nothing
                }
            }
            CompletionRule::CommitOrRollback => {
                if outcome.failed || outcome.rollback_only {
                    Completion::Rollback
                } else {
                    Completion::Commit
                }
            }
            CompletionRule::ReleaseOrRollbackToSavepoint => {
                if outcome.failed || outcome.rollback_only {
                    Completion::RollbackToSavepoint
                } else {
                    Completion::ReleaseIntoParent
                }
            }
            CompletionRule::AutoCommit => Completion::Nothing,
        }
    }
}
