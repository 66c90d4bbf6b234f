//! In-memory durable store.

use crate::store::{DurableStore, StoreError, StoreResult};
use crate::transaction::{PendingWrite, WriteRecord};
use crate::types::{ContextId, EntityKey, SequenceNumber};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// One entry of the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// Commit order.
    pub sequence: SequenceNumber,
    /// Context the writes were committed for.
    pub context: ContextId,
    /// Entity keys touched, in write order.
    pub keys: Vec<EntityKey>,
}

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<EntityKey, Vec<u8>>,
    log: Vec<CommitRecord>,
    last_seq: u64,
}

/// An in-memory durable store.
///
/// Keeps the committed state of every entity plus an ordered log of
/// commits. Suitable for:
/// - Unit and integration tests
/// - Running the scenario catalog
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use txprop_core::{ContextId, DurableStore, EntityKey, InMemoryStore, WriteRecord};
///
/// let store = InMemoryStore::new();
/// let key = EntityKey::new("order", "1");
/// let write = WriteRecord::put(key.clone(), "PROCESSING", ContextId::new(1));
/// store.commit(ContextId::new(1), &[write]).unwrap();
/// assert_eq!(store.read(&key).unwrap(), Some(b"PROCESSING".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent commits fail with [`StoreError::Unavailable`]
    /// (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a copy of all committed entities, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<EntityKey, Vec<u8>> {
        self.inner.read().entities.clone()
    }

    /// Returns a copy of the commit log.
    #[must_use]
    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.inner.read().log.clone()
    }

    /// Returns true if `key` has a committed value.
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.inner.read().entities.contains_key(key)
    }

    /// Returns the committed payload for `key` as UTF-8 text.
    #[must_use]
    pub fn get_str(&self, key: &EntityKey) -> Option<String> {
        self.inner
            .read()
            .entities
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns the number of committed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    /// Returns true if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entities.is_empty()
    }

    /// Clears all committed state and the commit log.
    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }
}

impl DurableStore for InMemoryStore {
    fn commit(&self, context: ContextId, writes: &[WriteRecord]) -> StoreResult<SequenceNumber> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        let mut inner = self.inner.write();
        for record in writes {
            match &record.write {
                PendingWrite::Put { payload } => {
                    inner.entities.insert(record.key.clone(), payload.clone());
                }
                PendingWrite::Delete => {
                    inner.entities.remove(&record.key);
                }
            }
        }

        inner.last_seq += 1;
        let sequence = SequenceNumber::new(inner.last_seq);
        inner.log.push(CommitRecord {
            sequence,
            context,
            keys: writes.iter().map(|w| w.key.clone()).collect(),
        });
        Ok(sequence)
    }

    fn read(&self, key: &EntityKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.read().entities.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(collection: &str, key: &str, value: &str, origin: u64) -> WriteRecord {
        WriteRecord::put(EntityKey::new(collection, key), value, ContextId::new(origin))
    }

    #[test]
    fn new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.commit_log().is_empty());
    }

    #[test]
    fn commit_applies_writes_in_order() {
        let store = InMemoryStore::new();
        let writes = vec![
            put("order", "1", "NEW", 1),
            put("order", "1", "PROCESSING", 1),
        ];

        let seq = store.commit(ContextId::new(1), &writes).unwrap();

        assert_eq!(seq.as_u64(), 1);
        assert_eq!(
            store.get_str(&EntityKey::new("order", "1")).as_deref(),
            Some("PROCESSING")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_removes_entity() {
        let store = InMemoryStore::new();
        let key = EntityKey::new("setting", "theme");
        store
            .commit(ContextId::new(1), &[put("setting", "theme", "dark", 1)])
            .unwrap();
        store
            .commit(
                ContextId::new(2),
                &[WriteRecord::delete(key.clone(), ContextId::new(2))],
            )
            .unwrap();

        assert!(!store.contains(&key));
        assert_eq!(store.read(&key).unwrap(), None);
    }

    #[test]
    fn sequence_numbers_increase() {
        let store = InMemoryStore::new();
        let s1 = store.commit(ContextId::new(1), &[]).unwrap();
        let s2 = store.commit(ContextId::new(2), &[]).unwrap();
        assert!(s2 > s1);
        assert_eq!(store.commit_log().len(), 2);
    }

    #[test]
    fn unavailable_store_rejects_whole_batch() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        let result = store.commit(ContextId::new(1), &[put("order", "1", "X", 1)]);
        assert_eq!(result, Err(StoreError::Unavailable));
        assert!(store.is_empty());
        assert!(store.commit_log().is_empty());

        store.set_unavailable(false);
        assert!(store.commit(ContextId::new(1), &[]).is_ok());
    }

    #[test]
    fn commit_log_records_context_and_keys() {
        let store = InMemoryStore::new();
        store
            .commit(
                ContextId::new(4),
                &[put("order", "1", "A", 4), put("log", "1", "B", 5)],
            )
            .unwrap();

        let log = store.commit_log();
        assert_eq!(log[0].context, ContextId::new(4));
        assert_eq!(
            log[0].keys,
            vec![EntityKey::new("order", "1"), EntityKey::new("log", "1")]
        );
    }

    #[test]
    fn clear_resets_everything() {
        let store = InMemoryStore::new();
        store
            .commit(ContextId::new(1), &[put("order", "1", "A", 1)])
            .unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.commit_log().is_empty());
        let seq = store.commit(ContextId::new(2), &[]).unwrap();
        assert_eq!(seq.as_u64(), 1);
    }
}
