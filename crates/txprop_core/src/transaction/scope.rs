//! Runner handle for operation bodies.

use crate::error::{PropagationError, PropagationResult};
use crate::propagation::Propagation;
use crate::transaction::manager::{Ambient, TransactionManager};
use crate::transaction::state::{PendingWrite, RollbackCause, TransactionContext, WriteRecord};
use crate::types::{ContextId, EntityKey};
use tracing::trace;

/// What a scope's writes go to.
enum Binding<'a> {
    /// Buffered into a context.
    Context(&'a mut TransactionContext),
    /// Auto-committed one by one.
    Detached,
}

/// The ambient context of one frame in a call chain.
///
/// A `Scope` is handed to every operation body. Writes issued through it
/// are buffered into the frame's context, or committed immediately when
/// the frame runs without one. Calls to other operations go through
/// [`Scope::run`], which resolves the callee's propagation mode against
/// this scope's context.
///
/// A scope borrows its context for as long as the body runs, so a body
/// can never keep a context alive past its frame, and the caller's
/// context is the ambient one again as soon as a child call returns.
pub struct Scope<'a> {
    manager: &'a TransactionManager,
    binding: Binding<'a>,
    /// Enclosing contexts visible to reads, outermost first.
    lineage: Vec<&'a TransactionContext>,
    /// True if this frame created its context.
    owner: bool,
    mode: Option<Propagation>,
    depth: usize,
}

impl<'a> Scope<'a> {
    /// The scope a call chain starts from.
    pub(crate) fn root(manager: &'a TransactionManager) -> Self {
        Self {
            manager,
            binding: Binding::Detached,
            lineage: Vec::new(),
            owner: false,
            mode: None,
            depth: 0,
        }
    }

    pub(crate) fn owner(
        manager: &'a TransactionManager,
        context: &'a mut TransactionContext,
        lineage: Vec<&'a TransactionContext>,
        mode: Propagation,
        depth: usize,
    ) -> Self {
        Self {
            manager,
            binding: Binding::Context(context),
            lineage,
            owner: true,
            mode: Some(mode),
            depth,
        }
    }

    pub(crate) fn participant(
        manager: &'a TransactionManager,
        context: &'a mut TransactionContext,
        lineage: Vec<&'a TransactionContext>,
        mode: Propagation,
        depth: usize,
    ) -> Self {
        Self {
            owner: false,
            ..Self::owner(manager, context, lineage, mode, depth)
        }
    }

    pub(crate) fn detached(manager: &'a TransactionManager, mode: Propagation, depth: usize) -> Self {
        Self {
            mode: Some(mode),
            depth,
            ..Self::root(manager)
        }
    }

    /// Runs `body` as a child operation declared with `mode`.
    ///
    /// # Errors
    ///
    /// - `NoTransaction` / `ExistingTransaction` if `mode` rejects this
    ///   scope's context (the body never runs)
    /// - `DepthExceeded` if the call chain is too deep
    /// - whatever the body returned
    /// - `UnexpectedRollback` if the child owned a context that a
    ///   participant doomed
    pub fn run<T, F>(&mut self, mode: Propagation, body: F) -> PropagationResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> PropagationResult<T>,
    {
        let manager = self.manager;
        let ambient = Ambient {
            context: match &mut self.binding {
                Binding::Context(ctx) => Some(&mut **ctx),
                Binding::Detached => None,
            },
            lineage: &self.lineage,
        };
        manager.execute(ambient, mode, self.depth + 1, body)
    }

    /// Writes `payload` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is no longer active, or if a
    /// detached write could not be committed.
    pub fn put(&mut self, key: EntityKey, payload: impl Into<Vec<u8>>) -> PropagationResult<()> {
        self.write(
            key,
            PendingWrite::Put {
                payload: payload.into(),
            },
        )
    }

    /// Deletes the entity under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`Scope::put`].
    pub fn delete(&mut self, key: EntityKey) -> PropagationResult<()> {
        self.write(key, PendingWrite::Delete)
    }

    fn write(&mut self, key: EntityKey, write: PendingWrite) -> PropagationResult<()> {
        match &mut self.binding {
            Binding::Context(ctx) => {
                trace!(context = %ctx.id(), %key, "buffered write");
                let origin = ctx.id();
                ctx.record(WriteRecord { key, write, origin })?;
                self.manager.record_buffered_write();
                Ok(())
            }
            Binding::Detached => self.manager.auto_commit(key, write),
        }
    }

    /// Reads `key` as this frame sees it.
    ///
    /// Buffered writes of this frame's context win, then those of
    /// enclosing nested parents (innermost first), then the durable store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn read(&self, key: &EntityKey) -> PropagationResult<Option<Vec<u8>>> {
        let own = match &self.binding {
            Binding::Context(ctx) => ctx.pending_write(key),
            Binding::Detached => None,
        };
        let buffered = own.or_else(|| {
            self.lineage
                .iter()
                .rev()
                .find_map(|ctx| ctx.pending_write(key))
        });

        match buffered {
            Some(PendingWrite::Put { payload }) => Ok(Some(payload.clone())),
            Some(PendingWrite::Delete) => Ok(None),
            None => Ok(self.manager.store().read(key)?),
        }
    }

    /// Marks this frame's context rollback-only.
    ///
    /// The context rolls back when its owner completes. If this frame owns
    /// the context the rollback is silent; if it only joined, the owner
    /// sees it as a participant's doing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the frame runs without a context.
    pub fn set_rollback_only(&mut self) -> PropagationResult<()> {
        let cause = if self.owner {
            RollbackCause::Requested
        } else {
            RollbackCause::Participant
        };
        match &mut self.binding {
            Binding::Context(ctx) => {
                ctx.mark_rollback_only(cause);
                Ok(())
            }
            Binding::Detached => Err(PropagationError::invalid_operation(
                "no transaction is active; cannot mark rollback-only",
            )),
        }
    }

    /// Returns the ambient context ID, if any.
    #[must_use]
    pub fn context_id(&self) -> Option<ContextId> {
        match &self.binding {
            Binding::Context(ctx) => Some(ctx.id()),
            Binding::Detached => None,
        }
    }

    /// Checks if writes are buffered into a context.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        matches!(self.binding, Binding::Context(_))
    }

    /// Checks if this frame created its context.
    #[must_use]
    pub fn is_new_transaction(&self) -> bool {
        self.owner && self.is_transactional()
    }

    /// Checks if the ambient context is doomed.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        match &self.binding {
            Binding::Context(ctx) => ctx.is_rollback_only(),
            Binding::Detached => false,
        }
    }

    /// Returns the number of writes buffered in the ambient context.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        match &self.binding {
            Binding::Context(ctx) => ctx.write_count(),
            Binding::Detached => 0,
        }
    }

    /// Returns the mode this frame was declared with (`None` at the root).
    #[must_use]
    pub fn mode(&self) -> Option<Propagation> {
        self.mode
    }

    /// Returns how many frames deep this scope is.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the manager.
    #[must_use]
    pub fn manager(&self) -> &TransactionManager {
        self.manager
    }
}

impl std::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("context", &self.context_id())
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::PropagationError;
    use crate::propagation::Propagation;
    use crate::store::InMemoryStore;
    use crate::transaction::TransactionManager;
    use crate::types::EntityKey;
    use std::sync::Arc;

    fn create_manager() -> (TransactionManager, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (TransactionManager::new(store.clone()), store)
    }

    fn order() -> EntityKey {
        EntityKey::new("order", "1")
    }

    #[test]
    fn caller_context_is_restored_after_child() {
        let (tm, _store) = create_manager();
        tm.run(Propagation::Required, |scope| {
            let outer = scope.context_id();
            scope.run(Propagation::RequiresNew, |inner| {
                assert_ne!(inner.context_id(), outer);
                Ok(())
            })?;
            assert_eq!(scope.context_id(), outer);
            scope.run(Propagation::NotSupported, |inner| {
                assert_eq!(inner.context_id(), None);
                Ok(())
            })?;
            assert_eq!(scope.context_id(), outer);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn joined_scope_shares_context() {
        let (tm, _store) = create_manager();
        tm.run(Propagation::Required, |scope| {
            let outer = scope.context_id();
            assert!(scope.is_new_transaction());
            scope.run(Propagation::Mandatory, |inner| {
                assert_eq!(inner.context_id(), outer);
                assert!(!inner.is_new_transaction());
                Ok(())
            })
        })
        .unwrap();
    }

    #[test]
    fn detached_writes_are_immediately_durable() {
        let (tm, store) = create_manager();
        tm.run(Propagation::Supports, |scope| {
            assert!(!scope.is_transactional());
            scope.put(order(), "PROCESSING")?;
            assert!(store.contains(&order()));
            Ok(())
        })
        .unwrap();
        assert_eq!(tm.stats().auto_commits(), 1);
    }

    #[test]
    fn detached_write_fails_when_store_unavailable() {
        let (tm, store) = create_manager();
        store.set_unavailable(true);
        let err = tm
            .run(Propagation::Never, |scope| scope.put(order(), "X"))
            .unwrap_err();
        assert!(matches!(err, PropagationError::Store(_)));
    }

    #[test]
    fn read_sees_own_buffered_writes() {
        let (tm, store) = create_manager();
        tm.run(Propagation::Required, |scope| {
            scope.put(order(), "NEW")?;
            assert_eq!(scope.read(&order())?, Some(b"NEW".to_vec()));
            assert!(!store.contains(&order()));
            scope.delete(order())?;
            assert_eq!(scope.read(&order())?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn nested_child_reads_parent_buffer() {
        let (tm, _store) = create_manager();
        tm.run(Propagation::Required, |scope| {
            scope.put(order(), "PROCESSING")?;
            scope.run(Propagation::Nested, |child| {
                assert_eq!(child.pending_writes(), 0);
                assert_eq!(child.read(&order())?, Some(b"PROCESSING".to_vec()));
                Ok(())
            })
        })
        .unwrap();
    }

    #[test]
    fn independent_context_reads_committed_state_only() {
        let (tm, _store) = create_manager();
        tm.run(Propagation::Required, |scope| {
            scope.put(order(), "PROCESSING")?;
            scope.run(Propagation::RequiresNew, |inner| {
                assert_eq!(inner.read(&order())?, None);
                Ok(())
            })
        })
        .unwrap();
    }

    #[test]
    fn set_rollback_only_requires_context() {
        let (tm, _store) = create_manager();
        let err = tm
            .run(Propagation::NotSupported, |scope| scope.set_rollback_only())
            .unwrap_err();
        assert!(matches!(err, PropagationError::InvalidOperation { .. }));
    }

    #[test]
    fn owner_rollback_request_is_silent() {
        let (tm, store) = create_manager();
        let value = tm
            .run(Propagation::Required, |scope| {
                scope.put(order(), "NEW")?;
                scope.set_rollback_only()?;
                Ok("done")
            })
            .unwrap();
        assert_eq!(value, "done");
        assert!(store.is_empty());
        assert_eq!(tm.stats().unexpected_rollbacks(), 0);
    }

    #[test]
    fn participant_rollback_request_is_unexpected() {
        let (tm, store) = create_manager();
        let err = tm
            .run(Propagation::Required, |scope| {
                scope.put(order(), "NEW")?;
                scope.run(Propagation::Supports, |inner| inner.set_rollback_only())
            })
            .unwrap_err();
        assert!(matches!(err, PropagationError::UnexpectedRollback { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn depth_increases_per_frame() {
        let (tm, _store) = create_manager();
        tm.run(Propagation::Supports, |scope| {
            assert_eq!(scope.depth(), 1);
            assert_eq!(scope.mode(), Some(Propagation::Supports));
            scope.run(Propagation::Required, |inner| {
                assert_eq!(inner.depth(), 2);
                Ok(())
            })
        })
        .unwrap();
    }
}
