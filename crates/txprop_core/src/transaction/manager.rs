//! Transaction manager.

use crate::config::ManagerConfig;
use crate::error::{PropagationError, PropagationResult};
use crate::propagation::{resolve, Completion, CompletionRule, Outcome, Propagation, Transition};
use crate::stats::ManagerStats;
use crate::store::DurableStore;
use crate::transaction::scope::Scope;
use crate::transaction::state::{PendingWrite, RollbackCause, TransactionContext, WriteRecord};
use crate::types::{ContextId, EntityKey};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Coordinates transaction contexts under propagation modes.
///
/// The manager provides:
/// - Policy resolution for every call (`run` / [`Scope::run`])
/// - Context transitions: join, begin, suspend, nest, run detached
/// - Completion: commit, rollback, rollback to savepoint, release into parent
/// - Durable commits through a [`DurableStore`]
///
/// ## Ambient Context
///
/// There is no global "current transaction". Each call chain carries its
/// ambient context in the [`Scope`] handed to its operation bodies, so
/// chains running on different threads never see each other's context,
/// and a caller's context is back in place as soon as a child call returns.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use txprop_core::{EntityKey, InMemoryStore, Propagation, PropagationError, TransactionManager};
///
/// let store = Arc::new(InMemoryStore::new());
/// let tm = TransactionManager::new(store.clone());
///
/// let result: Result<(), _> = tm.run(Propagation::Required, |scope| {
///     scope.put(EntityKey::new("order", "1"), "PROCESSING")?;
///     scope.run(Propagation::NotSupported, |scope| {
///         scope.put(EntityKey::new("notification", "1"), "sent")
///     })?;
///     Err(PropagationError::operation("Simulated error after notification!"))
/// });
///
/// assert!(result.is_err());
/// assert!(store.contains(&EntityKey::new("notification", "1")));
/// assert!(!store.contains(&EntityKey::new("order", "1")));
/// ```
pub struct TransactionManager {
    /// Where committed writes go.
    store: Arc<dyn DurableStore>,
    /// Behavior switches.
    config: ManagerConfig,
    /// Next context ID.
    next_id: AtomicU64,
    /// Counters.
    stats: ManagerStats,
    /// Contexts currently active on any thread.
    active: RwLock<Vec<ContextId>>,
}

/// The caller's side of a propagation call.
pub(crate) struct Ambient<'s> {
    /// The caller's context, if it has one.
    pub(crate) context: Option<&'s mut TransactionContext>,
    /// Contexts enclosing the caller's (nested parents), outermost first.
    pub(crate) lineage: &'s [&'s TransactionContext],
}

/// A frame waiting to be completed.
enum Frame<'f> {
    /// Reborrowed ambient context.
    Joined(&'f mut TransactionContext),
    /// Context created by this frame.
    Owned(&'f mut TransactionContext),
    /// Nested child and the parent it was carved out of.
    Child {
        child: &'f mut TransactionContext,
        parent: &'f mut TransactionContext,
    },
    /// No context.
    Detached,
}

impl Frame<'_> {
    fn rollback_only(&self) -> bool {
        match self {
            Frame::Joined(ctx) | Frame::Owned(ctx) => ctx.is_rollback_only(),
            Frame::Child { child, .. } => child.is_rollback_only(),
            Frame::Detached => false,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Frame::Joined(_) => "joined",
            Frame::Owned(_) => "owned",
            Frame::Child { .. } => "nested",
            Frame::Detached => "detached",
        }
    }
}

/// Removes a context from the active registry when its frame ends,
/// including when the body panics.
struct ActiveGuard<'m> {
    manager: &'m TransactionManager,
    id: ContextId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(context = %self.id, "context dropped during unwind; buffered writes discarded");
        }
        self.manager.active.write().retain(|&id| id != self.id);
    }
}

impl TransactionManager {
    /// Creates a new transaction manager with the default configuration.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self::with_config(store, ManagerConfig::default())
    }

    /// Creates a new transaction manager.
    pub fn with_config(store: Arc<dyn DurableStore>, config: ManagerConfig) -> Self {
        Self {
            store,
            config,
            next_id: AtomicU64::new(1),
            stats: ManagerStats::new(),
            active: RwLock::new(Vec::new()),
        }
    }

    /// Runs `body` under `mode` with no ambient context.
    ///
    /// This is the entry point for a call chain. Inside `body`, use
    /// [`Scope::run`] so child calls see the ambient context.
    ///
    /// # Errors
    ///
    /// - `NoTransaction` for `MANDATORY` (the body never runs)
    /// - whatever the body returned, after the completion rule was applied
    /// - `UnexpectedRollback` if a participant doomed the new context
    /// - `Store` if the durable commit failed
    pub fn run<T, F>(&self, mode: Propagation, body: F) -> PropagationResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> PropagationResult<T>,
    {
        Scope::root(self).run(mode, body)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// Returns the durable store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Returns the number of active contexts across all threads.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Returns the IDs of active contexts across all threads.
    #[must_use]
    pub fn active_contexts(&self) -> Vec<ContextId> {
        self.active.read().clone()
    }

    fn allocate_id(&self) -> ContextId {
        ContextId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, id: ContextId) -> ActiveGuard<'_> {
        self.active.write().push(id);
        ActiveGuard { manager: self, id }
    }

    /// Resolves and performs one propagation call on behalf of `ambient`.
    pub(crate) fn execute<T, F>(
        &self,
        ambient: Ambient<'_>,
        mode: Propagation,
        depth: usize,
        body: F,
    ) -> PropagationResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> PropagationResult<T>,
    {
        if depth > self.config.max_depth {
            self.stats.record_rejection();
            return Err(PropagationError::DepthExceeded {
                depth,
                max: self.config.max_depth,
            });
        }

        let ambient_id = ambient.context.as_ref().map(|ctx| ctx.id());
        let transition = resolve(mode, ambient_id)
            .map_err(|err| {
                self.stats.record_rejection();
                debug!(%mode, depth, error = %err, "propagation rejected");
                err
            })?
            .with_nested_strategy(self.config.nested_strategy);
        let rule = transition.completion_rule();

        match (transition, ambient.context) {
            (Transition::Join { context }, Some(ctx)) => {
                self.stats.record_join();
                debug!(%context, %mode, depth, "joined ambient context");
                let result = {
                    let mut scope =
                        Scope::participant(self, &mut *ctx, ambient.lineage.to_vec(), mode, depth);
                    body(&mut scope)
                };
                self.complete(Frame::Joined(ctx), rule, result)
            }
            (Transition::Nest { parent: parent_id }, Some(parent)) => {
                let mut child = TransactionContext::nested(self.allocate_id(), parent);
                let _guard = self.register(child.id());
                self.stats.record_begin();
                self.stats.record_savepoint();
                debug!(
                    context = %child.id(),
                    parent = %parent_id,
                    savepoint = ?child.savepoint(),
                    %mode,
                    depth,
                    "began nested context"
                );
                let result = {
                    let mut lineage = ambient.lineage.to_vec();
                    lineage.push(&*parent);
                    let mut scope = Scope::owner(self, &mut child, lineage, mode, depth);
                    body(&mut scope)
                };
                self.complete(
                    Frame::Child {
                        child: &mut child,
                        parent,
                    },
                    rule,
                    result,
                )
            }
            (Transition::Begin, _) => self.run_owned(None, mode, depth, rule, body),
            (Transition::SuspendAndBegin { suspended }, _) => {
                self.stats.record_suspension();
                debug!(%suspended, %mode, depth, "suspended ambient context");
                let result = self.run_owned(Some(suspended), mode, depth, rule, body);
                debug!(%suspended, "resumed ambient context");
                result
            }
            (Transition::RunDetached, _) => self.run_detached(mode, depth, rule, body),
            (Transition::SuspendAndRunDetached { suspended }, _) => {
                self.stats.record_suspension();
                debug!(%suspended, %mode, depth, "suspended ambient context");
                let result = self.run_detached(mode, depth, rule, body);
                debug!(%suspended, "resumed ambient context");
                result
            }
            (transition, None) => Err(PropagationError::invalid_operation(format!(
                "transition '{transition}' requires an ambient context"
            ))),
        }
    }

    fn run_owned<T, F>(
        &self,
        suspended: Option<ContextId>,
        mode: Propagation,
        depth: usize,
        rule: CompletionRule,
        body: F,
    ) -> PropagationResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> PropagationResult<T>,
    {
        let id = self.allocate_id();
        let mut ctx = match suspended {
            Some(suspended) => TransactionContext::independent(id, suspended),
            None => TransactionContext::new(id),
        };
        let _guard = self.register(id);
        self.stats.record_begin();
        debug!(context = %id, %mode, depth, "began context");

        let result = {
            let mut scope = Scope::owner(self, &mut ctx, Vec::new(), mode, depth);
            body(&mut scope)
        };
        self.complete(Frame::Owned(&mut ctx), rule, result)
    }

    fn run_detached<T, F>(
        &self,
        mode: Propagation,
        depth: usize,
        rule: CompletionRule,
        body: F,
    ) -> PropagationResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> PropagationResult<T>,
    {
        trace!(%mode, depth, "running without transaction");
        let result = {
            let mut scope = Scope::detached(self, mode, depth);
            body(&mut scope)
        };
        self.complete(Frame::Detached, rule, result)
    }

    /// Applies the completion rule to a frame.
    fn complete<T>(
        &self,
        frame: Frame<'_>,
        rule: CompletionRule,
        result: PropagationResult<T>,
    ) -> PropagationResult<T> {
        let outcome = Outcome {
            failed: result.is_err(),
            rollback_only: frame.rollback_only(),
        };
        let completion = rule.decide(outcome);

        match (completion, frame) {
            (Completion::Nothing, _) => result,
            (Completion::MarkRollbackOnly, Frame::Joined(ctx)) => {
                if self.config.rollback_on_participation_failure {
                    debug!(context = %ctx.id(), "participant failed; marking context rollback-only");
                    ctx.mark_rollback_only(RollbackCause::Participant);
                }
                result
            }
            (Completion::Commit, Frame::Owned(ctx)) => {
                self.commit(ctx)?;
                result
            }
            (Completion::Rollback, Frame::Owned(ctx)) => self.rollback(ctx, result),
            (Completion::ReleaseIntoParent, Frame::Child { child, parent }) => {
                let released = child.write_count();
                parent.absorb(child)?;
                self.stats.record_release();
                debug!(
                    context = %child.id(),
                    parent = %parent.id(),
                    released,
                    "released nested context into parent"
                );
                result
            }
            (Completion::RollbackToSavepoint, Frame::Child { child, parent }) => {
                debug!(
                    context = %child.id(),
                    parent = %parent.id(),
                    savepoint = ?child.savepoint(),
                    "rolling back to savepoint"
                );
                self.rollback(child, result)
            }
            (completion, frame) => Err(PropagationError::invalid_operation(format!(
                "completion {completion:?} does not apply to a {} frame",
                frame.describe()
            ))),
        }
    }

    fn commit(&self, ctx: &mut TransactionContext) -> PropagationResult<()> {
        let writes = ctx.take_writes()?;
        if writes.is_empty() {
            ctx.mark_committed();
            self.stats.record_commit();
            debug!(context = %ctx.id(), "committed empty context");
            return Ok(());
        }

        match self.store.commit(ctx.id(), &writes) {
            Ok(sequence) => {
                ctx.mark_committed();
                self.stats.record_commit();
                debug!(context = %ctx.id(), %sequence, writes = writes.len(), "committed context");
                Ok(())
            }
            Err(err) => {
                ctx.mark_rolled_back();
                self.stats.record_rollback();
                warn!(context = %ctx.id(), error = %err, "durable commit failed; context rolled back");
                Err(err.into())
            }
        }
    }

    /// Rolls back `ctx`, keeping the body's error if there was one.
    fn rollback<T>(
        &self,
        ctx: &mut TransactionContext,
        result: PropagationResult<T>,
    ) -> PropagationResult<T> {
        let discarded = ctx.write_count();
        if let Err(err) = ctx.rollback() {
            // Don't mask the body's error.
            warn!(context = %ctx.id(), error = %err, "rollback failed");
        }
        self.stats.record_rollback();
        debug!(context = %ctx.id(), discarded, "rolled back context");

        match result {
            Err(err) => Err(err),
            Ok(value) => match ctx.rollback_cause() {
                Some(RollbackCause::Participant) if self.config.fail_on_unexpected_rollback => {
                    self.stats.record_unexpected_rollback();
                    warn!(context = %ctx.id(), "context completed normally but was marked rollback-only");
                    Err(PropagationError::UnexpectedRollback { context: ctx.id() })
                }
                _ => Ok(value),
            },
        }
    }

    /// Commits a single write outside any transaction.
    pub(crate) fn auto_commit(&self, key: EntityKey, write: PendingWrite) -> PropagationResult<()> {
        let id = self.allocate_id();
        let record = WriteRecord {
            key,
            write,
            origin: id,
        };
        let sequence = self.store.commit(id, std::slice::from_ref(&record))?;
        self.stats.record_auto_commit();
        trace!(context = %id, key = %record.key, %sequence, "auto-committed write");
        Ok(())
    }

    pub(crate) fn record_buffered_write(&self) {
        self.stats.record_buffered_write();
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("active_count", &self.active_count())
            .finish_non_exhaustive()
    }
}
