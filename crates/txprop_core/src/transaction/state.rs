//! Transaction context state.

use crate::error::{PropagationError, PropagationResult};
use crate::types::{ContextId, EntityKey};
use serde::Serialize;

/// State of a transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextState {
    /// Context is active and can buffer writes.
    Active,
    /// Context has been committed (or, for a nested child, released into
    /// its parent).
    Committed,
    /// Context has been rolled back.
    RolledBack,
}

/// Why a context was marked rollback-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RollbackCause {
    /// The owning operation asked for it.
    Requested,
    /// A participant that joined the context failed or asked for rollback.
    Participant,
}

/// A buffered write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PendingWrite {
    /// Insert or update an entity.
    Put {
        /// Entity payload.
        payload: Vec<u8>,
    },
    /// Delete an entity.
    Delete,
}

/// A write together with its target and the context it was issued in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRecord {
    /// Target entity.
    pub key: EntityKey,
    /// The write itself.
    pub write: PendingWrite,
    /// Context that was active when the write was issued.
    pub origin: ContextId,
}

impl WriteRecord {
    /// Creates a put record.
    pub fn put(key: EntityKey, payload: impl Into<Vec<u8>>, origin: ContextId) -> Self {
        Self {
            key,
            write: PendingWrite::Put {
                payload: payload.into(),
            },
            origin,
        }
    }

    /// Creates a delete record.
    pub fn delete(key: EntityKey, origin: ContextId) -> Self {
        Self {
            key,
            write: PendingWrite::Delete,
            origin,
        }
    }
}

/// One logical unit of work.
///
/// A context buffers writes until its owner commits or rolls it back.
/// Contexts never own their parent: `parent` is a back-reference used for
/// diagnostics and, for nested children, `savepoint` records how many
/// writes the parent had buffered when the child began.
#[derive(Debug)]
pub struct TransactionContext {
    /// Context ID.
    id: ContextId,
    /// Suspended or enclosing context, if any.
    parent: Option<ContextId>,
    /// Parent write count at nesting time.
    savepoint: Option<usize>,
    /// Current state.
    state: ContextState,
    /// Set once, never cleared.
    rollback_only: Option<RollbackCause>,
    /// Buffered writes in issue order.
    writes: Vec<WriteRecord>,
}

impl TransactionContext {
    /// Creates a new top-level context.
    pub(crate) fn new(id: ContextId) -> Self {
        Self {
            id,
            parent: None,
            savepoint: None,
            state: ContextState::Active,
            rollback_only: None,
            writes: Vec::new(),
        }
    }

    /// Creates an independent context that suspends `suspended`.
    pub(crate) fn independent(id: ContextId, suspended: ContextId) -> Self {
        Self {
            parent: Some(suspended),
            ..Self::new(id)
        }
    }

    /// Creates a nested child of `parent`, recording the savepoint.
    pub(crate) fn nested(id: ContextId, parent: &TransactionContext) -> Self {
        Self {
            parent: Some(parent.id),
            savepoint: Some(parent.write_count()),
            ..Self::new(id)
        }
    }

    /// Returns the context ID.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the parent context ID.
    #[must_use]
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Returns the savepoint recorded in the parent, for nested children.
    #[must_use]
    pub fn savepoint(&self) -> Option<usize> {
        self.savepoint
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Checks if the context is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ContextState::Active
    }

    /// Checks if the context is doomed to roll back.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.is_some()
    }

    /// Returns why the context was marked rollback-only.
    #[must_use]
    pub fn rollback_cause(&self) -> Option<RollbackCause> {
        self.rollback_only
    }

    /// Marks the context rollback-only.
    ///
    /// An owner's request wins over a participant's: once the owner has
    /// asked for rollback, the rollback is expected.
    pub(crate) fn mark_rollback_only(&mut self, cause: RollbackCause) {
        self.rollback_only = match (self.rollback_only, cause) {
            (_, RollbackCause::Requested) => Some(RollbackCause::Requested),
            (None, RollbackCause::Participant) => Some(RollbackCause::Participant),
            (Some(existing), RollbackCause::Participant) => Some(existing),
        };
    }

    /// Buffers a write.
    pub(crate) fn record(&mut self, record: WriteRecord) -> PropagationResult<()> {
        self.ensure_active()?;
        self.writes.push(record);
        Ok(())
    }

    /// Returns the latest buffered write for `key`.
    #[must_use]
    pub fn pending_write(&self, key: &EntityKey) -> Option<&PendingWrite> {
        self.writes
            .iter()
            .rev()
            .find(|record| &record.key == key)
            .map(|record| &record.write)
    }

    /// Returns all buffered writes in issue order.
    #[must_use]
    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    /// Returns the number of buffered writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Moves a successful child's writes into this context.
    pub(crate) fn absorb(&mut self, child: &mut TransactionContext) -> PropagationResult<()> {
        self.ensure_active()?;
        child.ensure_active()?;
        self.writes.append(&mut child.writes);
        child.state = ContextState::Committed;
        Ok(())
    }

    /// Takes the buffered writes for a durable commit.
    pub(crate) fn take_writes(&mut self) -> PropagationResult<Vec<WriteRecord>> {
        self.ensure_active()?;
        Ok(std::mem::take(&mut self.writes))
    }

    /// Marks the context as committed.
    pub(crate) fn mark_committed(&mut self) {
        self.state = ContextState::Committed;
    }

    /// Discards buffered writes and marks the context as rolled back.
    pub(crate) fn rollback(&mut self) -> PropagationResult<()> {
        self.ensure_active()?;
        self.writes.clear();
        self.state = ContextState::RolledBack;
        Ok(())
    }

    /// Marks the context as rolled back after a failed durable commit.
    pub(crate) fn mark_rolled_back(&mut self) {
        self.writes.clear();
        self.state = ContextState::RolledBack;
    }

    fn ensure_active(&self) -> PropagationResult<()> {
        match self.state {
            ContextState::Active => Ok(()),
            ContextState::Committed => Err(PropagationError::invalid_operation(format!(
                "context {} already committed",
                self.id
            ))),
            ContextState::RolledBack => Err(PropagationError::invalid_operation(format!(
                "context {} already rolled back",
                self.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_ctx() -> TransactionContext {
        TransactionContext::new(ContextId::new(1))
    }

    fn order(status: &str, origin: ContextId) -> WriteRecord {
        WriteRecord::put(EntityKey::new("order", "1"), status, origin)
    }

    #[test]
    fn new_context_is_active() {
        let ctx = create_ctx();
        assert!(ctx.is_active());
        assert!(!ctx.is_rollback_only());
        assert_eq!(ctx.parent(), None);
        assert_eq!(ctx.savepoint(), None);
    }

    #[test]
    fn record_buffers_in_order() {
        let mut ctx = create_ctx();
        ctx.record(order("NEW", ctx.id())).unwrap();
        ctx.record(order("PROCESSING", ctx.id())).unwrap();

        assert_eq!(ctx.write_count(), 2);
        assert_eq!(
            ctx.pending_write(&EntityKey::new("order", "1")),
            Some(&PendingWrite::Put {
                payload: b"PROCESSING".to_vec()
            })
        );
    }

    #[test]
    fn cannot_write_after_commit() {
        let mut ctx = create_ctx();
        ctx.mark_committed();
        assert!(ctx.record(order("X", ctx.id())).is_err());
    }

    #[test]
    fn cannot_roll_back_twice() {
        let mut ctx = create_ctx();
        ctx.record(order("X", ctx.id())).unwrap();
        ctx.rollback().unwrap();
        assert_eq!(ctx.state(), ContextState::RolledBack);
        assert_eq!(ctx.write_count(), 0);
        assert!(ctx.rollback().is_err());
    }

    #[test]
    fn rollback_only_is_never_cleared() {
        let mut ctx = create_ctx();
        ctx.mark_rollback_only(RollbackCause::Participant);
        ctx.mark_rollback_only(RollbackCause::Participant);
        assert!(ctx.is_rollback_only());
        assert_eq!(ctx.rollback_cause(), Some(RollbackCause::Participant));
    }

    #[test]
    fn owner_request_overrides_participant() {
        let mut ctx = create_ctx();
        ctx.mark_rollback_only(RollbackCause::Participant);
        ctx.mark_rollback_only(RollbackCause::Requested);
        assert_eq!(ctx.rollback_cause(), Some(RollbackCause::Requested));

        ctx.mark_rollback_only(RollbackCause::Participant);
        assert_eq!(ctx.rollback_cause(), Some(RollbackCause::Requested));
    }

    #[test]
    fn nested_child_records_savepoint() {
        let mut parent = create_ctx();
        parent.record(order("PROCESSING", parent.id())).unwrap();

        let child = TransactionContext::nested(ContextId::new(2), &parent);
        assert_eq!(child.parent(), Some(parent.id()));
        assert_eq!(child.savepoint(), Some(1));
    }

    #[test]
    fn absorb_moves_child_writes_to_parent() {
        let mut parent = create_ctx();
        parent.record(order("PROCESSING", parent.id())).unwrap();
        let mut child = TransactionContext::nested(ContextId::new(2), &parent);
        child
            .record(WriteRecord::put(
                EntityKey::new("log", "1"),
                "logged",
                child.id(),
            ))
            .unwrap();

        parent.absorb(&mut child).unwrap();

        assert_eq!(parent.write_count(), 2);
        assert_eq!(parent.writes()[1].origin, ContextId::new(2));
        assert_eq!(child.state(), ContextState::Committed);
        assert_eq!(child.write_count(), 0);
    }

    #[test]
    fn take_writes_empties_buffer() {
        let mut ctx = create_ctx();
        ctx.record(order("A", ctx.id())).unwrap();
        let writes = ctx.take_writes().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(ctx.write_count(), 0);
        assert!(ctx.is_active());
    }

    #[test]
    fn independent_context_remembers_suspended() {
        let ctx = TransactionContext::independent(ContextId::new(5), ContextId::new(1));
        assert_eq!(ctx.parent(), Some(ContextId::new(1)));
        assert_eq!(ctx.savepoint(), None);
    }
}
