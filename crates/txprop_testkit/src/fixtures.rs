//! Test fixtures and harness helpers.
//!
//! Provides a manager wired to an in-memory store that tests can inspect
//! and seed directly.

use std::sync::Arc;
use txprop_core::{
    ContextId, DurableStore, EntityKey, InMemoryStore, ManagerConfig, TransactionManager,
    WriteRecord,
};

/// A transaction manager with an inspectable in-memory store.
pub struct TestHarness {
    /// The manager under test.
    pub manager: TransactionManager,
    /// The store behind the manager.
    pub store: Arc<InMemoryStore>,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            manager: TransactionManager::with_config(store.clone(), config),
            store,
        }
    }

    /// Commits `payload` under `key` directly to the store, bypassing the
    /// manager. Used to set up pre-existing rows.
    pub fn seed(&self, key: EntityKey, payload: &str) {
        let origin = ContextId::new(0);
        self.store
            .commit(origin, &[WriteRecord::put(key, payload, origin)])
            .expect("Failed to seed store");
    }

    /// Returns the committed payload for `key` as text.
    pub fn entity(&self, key: &EntityKey) -> Option<String> {
        self.store.get_str(key)
    }

    /// Returns true if `key` has a committed value.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.store.contains(key)
    }

    /// Returns the committed keys, sorted.
    pub fn durable_keys(&self) -> Vec<EntityKey> {
        self.store.snapshot().into_keys().collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHarness {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Runs a test with a fresh harness.
///
/// # Example
///
/// ```rust
/// use txprop_testkit::{keys, with_harness};
/// use txprop_core::Propagation;
///
/// with_harness(|h| {
///     h.run(Propagation::Never, |scope| scope.put(keys::setting("app_theme"), "dark"))
///         .unwrap();
///     assert!(h.contains(&keys::setting("app_theme")));
/// });
/// ```
pub fn with_harness<F, R>(f: F) -> R
where
    F: FnOnce(&TestHarness) -> R,
{
    let harness = TestHarness::new();
    f(&harness)
}

/// Entity keys used by the order-processing scenarios.
pub mod keys {
    use txprop_core::EntityKey;

    /// An order row.
    pub fn order(id: u64) -> EntityKey {
        EntityKey::new("order", id.to_string())
    }

    /// An order log row.
    pub fn order_log(order_id: u64) -> EntityKey {
        EntityKey::new("order_log", order_id.to_string())
    }

    /// An inventory row.
    pub fn inventory(product: &str) -> EntityKey {
        EntityKey::new("inventory", product)
    }

    /// A report row.
    pub fn report(order_id: u64) -> EntityKey {
        EntityKey::new("report", order_id.to_string())
    }

    /// A notification row.
    pub fn notification(order_id: u64) -> EntityKey {
        EntityKey::new("notification", order_id.to_string())
    }

    /// A sales report row.
    pub fn sales_report(order_id: u64) -> EntityKey {
        EntityKey::new("sales_report", order_id.to_string())
    }

    /// An order history row.
    pub fn history(order_id: u64) -> EntityKey {
        EntityKey::new("order_history", order_id.to_string())
    }

    /// A status log row.
    pub fn status_log(order_id: u64) -> EntityKey {
        EntityKey::new("log", order_id.to_string())
    }

    /// A system setting.
    pub fn setting(name: &str) -> EntityKey {
        EntityKey::new("setting", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txprop_core::Propagation;

    #[test]
    fn seeded_rows_are_visible() {
        let h = TestHarness::new();
        h.seed(keys::order(1), "NEW");
        assert_eq!(h.entity(&keys::order(1)).as_deref(), Some("NEW"));
        assert_eq!(h.durable_keys(), vec![keys::order(1)]);
    }

    #[test]
    fn harness_derefs_to_manager() {
        let h = TestHarness::new();
        h.run(Propagation::Required, |scope| scope.put(keys::order(2), "NEW"))
            .unwrap();
        assert_eq!(h.stats().commits(), 1);
        assert!(h.contains(&keys::order(2)));
    }
}
