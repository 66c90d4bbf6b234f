//! Scenario catalog.
//!
//! Each scenario is an order-processing call chain run against a fresh
//! harness. Running one yields a [`ScenarioReport`] with the outcome of the
//! top-level call and the durable state it left behind.
//!
//! Operations are plain functions over a [`Scope`]; the propagation mode
//! is given where they are called, e.g.
//! `scope.run(Propagation::RequiresNew, generate_report)`.

use crate::fixtures::{keys, TestHarness};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;
use txprop_core::{
    CommitRecord, ContextId, EntityKey, ManagerConfig, Propagation, PropagationError,
    PropagationResult, Scope, StatsSnapshot,
};

const ORDER_ID: u64 = 1;

/// Outcome of a scenario's top-level call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// The call returned normally.
    Completed,
    /// An operation failure reached the top.
    OperationFailed {
        /// Failure reason.
        reason: String,
    },
    /// The top-level context was doomed by a participant.
    UnexpectedRollback {
        /// The rolled back context.
        context: ContextId,
    },
    /// `MANDATORY` was called without a transaction.
    NoTransaction,
    /// `NEVER` was called inside a transaction.
    ExistingTransaction,
    /// Any other error.
    Error {
        /// Error message.
        message: String,
    },
}

impl ScenarioOutcome {
    /// Classifies the result of a top-level call.
    pub fn from_result(result: &PropagationResult<()>) -> Self {
        match result {
            Ok(()) => ScenarioOutcome::Completed,
            Err(PropagationError::Operation(failure)) => ScenarioOutcome::OperationFailed {
                reason: failure.reason.clone(),
            },
            Err(PropagationError::UnexpectedRollback { context }) => {
                ScenarioOutcome::UnexpectedRollback { context: *context }
            }
            Err(PropagationError::NoTransaction { .. }) => ScenarioOutcome::NoTransaction,
            Err(PropagationError::ExistingTransaction { .. }) => {
                ScenarioOutcome::ExistingTransaction
            }
            Err(err) => ScenarioOutcome::Error {
                message: err.to_string(),
            },
        }
    }

    /// Returns true if the call returned normally.
    pub fn is_completed(&self) -> bool {
        matches!(self, ScenarioOutcome::Completed)
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioOutcome::Completed => f.write_str("completed"),
            ScenarioOutcome::OperationFailed { reason } => write!(f, "failed: {reason}"),
            ScenarioOutcome::UnexpectedRollback { context } => {
                write!(f, "unexpected rollback of {context}")
            }
            ScenarioOutcome::NoTransaction => f.write_str("no existing transaction"),
            ScenarioOutcome::ExistingTransaction => f.write_str("existing transaction"),
            ScenarioOutcome::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Result of running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: &'static str,
    /// One-line title.
    pub title: &'static str,
    /// Outcome of the top-level call.
    pub outcome: ScenarioOutcome,
    /// Committed entities (`collection/key` to payload text).
    pub entities: BTreeMap<String, String>,
    /// Commit log, including seeded rows.
    pub commits: Vec<CommitRecord>,
    /// Manager counters after the run.
    pub stats: StatsSnapshot,
}

impl ScenarioReport {
    /// Returns the committed payload for `key`.
    pub fn entity(&self, key: &EntityKey) -> Option<&str> {
        self.entities.get(&key.to_string()).map(String::as_str)
    }

    /// Returns true if `key` has a committed value.
    pub fn has(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(&key.to_string())
    }
}

/// A named, runnable call chain.
pub struct Scenario {
    /// Unique name, used on the command line.
    pub name: &'static str,
    /// One-line title.
    pub title: &'static str,
    /// What the scenario demonstrates.
    pub summary: &'static str,
    body: fn(&TestHarness) -> PropagationResult<()>,
}

impl Scenario {
    /// Runs the scenario with the default configuration.
    pub fn run(&self) -> ScenarioReport {
        self.run_with(ManagerConfig::default())
    }

    /// Runs the scenario against a fresh harness built from `config`.
    pub fn run_with(&self, config: ManagerConfig) -> ScenarioReport {
        let harness = TestHarness::with_config(config);
        info!(scenario = self.name, "{}", self.title);

        let result = (self.body)(&harness);
        let outcome = ScenarioOutcome::from_result(&result);
        info!(scenario = self.name, %outcome, "scenario finished");

        ScenarioReport {
            name: self.name,
            title: self.title,
            outcome,
            entities: harness
                .store
                .snapshot()
                .into_iter()
                .map(|(key, payload)| {
                    (key.to_string(), String::from_utf8_lossy(&payload).into_owned())
                })
                .collect(),
            commits: harness.store.commit_log(),
            stats: harness.stats().snapshot(),
        }
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Returns every scenario, in catalog order.
pub fn catalog() -> &'static [Scenario] {
    &CATALOG
}

/// Looks up a scenario by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|scenario| scenario.name == name)
}

static CATALOG: [Scenario; 16] = [
    Scenario {
        name: "required-handled",
        title: "REQUIRED participant fails, caller handles the error",
        summary: "The log failure dooms the shared context; the caller's commit becomes an unexpected rollback.",
        body: required_handled,
    },
    Scenario {
        name: "requires-new-handled",
        title: "REQUIRES_NEW log fails, caller handles the error",
        summary: "Only the independent log context rolls back; the order and inventory commit.",
        body: requires_new_handled,
    },
    Scenario {
        name: "required-rethrow",
        title: "REQUIRED participant fails, caller rethrows",
        summary: "The failure reaches the owner, which rolls back everything.",
        body: required_rethrow,
    },
    Scenario {
        name: "manual-rollback",
        title: "Caller handles the error and marks rollback-only",
        summary: "The owner asked for rollback, so it is silent: nothing is durable, the call completes.",
        body: manual_rollback,
    },
    Scenario {
        name: "requires-new-try-catch",
        title: "REQUIRES_NEW report fails, caller catches",
        summary: "The report context rolls back on its own; the order commits.",
        body: requires_new_try_catch,
    },
    Scenario {
        name: "requires-new-no-catch",
        title: "REQUIRES_NEW report fails, error propagates",
        summary: "Both the report context and the caller's context roll back.",
        body: requires_new_no_catch,
    },
    Scenario {
        name: "supports-with-transaction",
        title: "SUPPORTS notification fails inside a transaction",
        summary: "The notification joined the order context, so its failure dooms it.",
        body: supports_with_transaction,
    },
    Scenario {
        name: "supports-without-transaction",
        title: "SUPPORTS notification fails without a transaction",
        summary: "Every write auto-commits; the failure stops the flow before the report.",
        body: supports_without_transaction,
    },
    Scenario {
        name: "not-supported-notification",
        title: "NOT_SUPPORTED notification, caller fails afterwards",
        summary: "The notification committed while the order context was suspended; the order rolls back.",
        body: not_supported_notification,
    },
    Scenario {
        name: "supports-notification",
        title: "SUPPORTS notification, caller fails afterwards",
        summary: "The notification joined the order context and rolls back with it.",
        body: supports_notification,
    },
    Scenario {
        name: "never-inside-transaction",
        title: "NEVER called from a transaction",
        summary: "The setting is rejected before it runs; the admin task rolls back.",
        body: never_inside_transaction,
    },
    Scenario {
        name: "never-standalone",
        title: "NEVER called without a transaction",
        summary: "The setting auto-commits.",
        body: never_standalone,
    },
    Scenario {
        name: "mandatory-inside-transaction",
        title: "MANDATORY operations inside a transaction",
        summary: "Both operations join the caller's context and commit together.",
        body: mandatory_inside_transaction,
    },
    Scenario {
        name: "mandatory-standalone",
        title: "MANDATORY operation called directly",
        summary: "Rejected with no existing transaction; the order is unchanged.",
        body: mandatory_standalone,
    },
    Scenario {
        name: "nested-history-fails",
        title: "NESTED history fails, NESTED log succeeds",
        summary: "Only the history rolls back to its savepoint; order status and log commit.",
        body: nested_history_fails,
    },
    Scenario {
        name: "nested-log-fails",
        title: "NESTED history succeeds, NESTED log fails",
        summary: "Only the log rolls back to its savepoint; order status and history commit.",
        body: nested_log_fails,
    },
];

// Operations

fn save_order(scope: &mut Scope<'_>, product: &str) -> PropagationResult<()> {
    scope.put(keys::order(ORDER_ID), product)?;
    info!(product, "Order saved successfully!");
    Ok(())
}

fn save_order_log(scope: &mut Scope<'_>) -> PropagationResult<()> {
    scope.put(
        keys::order_log(ORDER_ID),
        format!("Order log created for order ID: {ORDER_ID}"),
    )?;
    Err(PropagationError::operation("Simulated log save error"))
}

fn update_inventory(scope: &mut Scope<'_>, product: &str, quantity: u32) -> PropagationResult<()> {
    scope.put(keys::inventory(product), quantity.to_string())?;
    info!(product, quantity, "Inventory updated");
    Ok(())
}

fn generate_report(scope: &mut Scope<'_>) -> PropagationResult<()> {
    scope.put(
        keys::report(ORDER_ID),
        format!("Report for order ID: {ORDER_ID}"),
    )?;
    Err(PropagationError::operation("Simulated report error"))
}

fn save_report(scope: &mut Scope<'_>) -> PropagationResult<()> {
    scope.put(
        keys::report(ORDER_ID),
        "Order status updated and notification sent.",
    )?;
    info!("Report saved successfully.");
    Ok(())
}

fn update_status(scope: &mut Scope<'_>, status: &str) -> PropagationResult<()> {
    scope.put(keys::order(ORDER_ID), status)?;
    info!(status, "Order status updated");
    Ok(())
}

/// Loads the order first; fails if it does not exist.
fn update_existing_order(scope: &mut Scope<'_>, status: &str) -> PropagationResult<()> {
    if scope.read(&keys::order(ORDER_ID))?.is_none() {
        return Err(PropagationError::operation("Order not found."));
    }
    update_status(scope, status)
}

fn send_notification(scope: &mut Scope<'_>, fail: bool) -> PropagationResult<()> {
    scope.put(keys::notification(ORDER_ID), "Your order is now processing.")?;
    info!("Notification saved.");
    if fail {
        return Err(PropagationError::operation("Simulated notification error."));
    }
    Ok(())
}

fn save_setting(scope: &mut Scope<'_>, name: &str, value: &str) -> PropagationResult<()> {
    scope.put(keys::setting(name), value)?;
    info!(name, value, "System setting saved successfully.");
    Ok(())
}

fn create_sales_report(scope: &mut Scope<'_>, amount: f64) -> PropagationResult<()> {
    scope.put(keys::sales_report(ORDER_ID), amount.to_string())?;
    info!(amount, "Sales report created successfully.");
    Ok(())
}

fn record_history(scope: &mut Scope<'_>, status: &str, fail: bool) -> PropagationResult<()> {
    scope.put(keys::history(ORDER_ID), status)?;
    if fail {
        return Err(PropagationError::operation("Simulated history error."));
    }
    Ok(())
}

fn log_status(scope: &mut Scope<'_>, status: &str, fail: bool) -> PropagationResult<()> {
    scope.put(
        keys::status_log(ORDER_ID),
        format!("Order status updated to: {status}"),
    )?;
    if fail {
        return Err(PropagationError::operation("Simulated log error."));
    }
    Ok(())
}

// Call chains

fn place_order(
    h: &TestHarness,
    log_mode: Propagation,
    on_log_error: fn(&mut Scope<'_>, PropagationError) -> PropagationResult<()>,
) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        save_order(scope, "Laptop")?;
        if let Err(err) = scope.run(log_mode, save_order_log) {
            info!(error = %err, "Error while saving log");
            on_log_error(scope, err)?;
        }
        scope.run(Propagation::Required, |scope| {
            update_inventory(scope, "Laptop", 1)
        })
    })
}

fn required_handled(h: &TestHarness) -> PropagationResult<()> {
    place_order(h, Propagation::Required, |_, _| Ok(()))
}

fn requires_new_handled(h: &TestHarness) -> PropagationResult<()> {
    place_order(h, Propagation::RequiresNew, |_, _| Ok(()))
}

fn required_rethrow(h: &TestHarness) -> PropagationResult<()> {
    place_order(h, Propagation::Required, |_, err| Err(err))
}

fn manual_rollback(h: &TestHarness) -> PropagationResult<()> {
    place_order(h, Propagation::Required, |scope, _| scope.set_rollback_only())
}

fn requires_new_try_catch(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        save_order(scope, "Smartphone")?;
        if let Err(err) = scope.run(Propagation::RequiresNew, generate_report) {
            info!(error = %err, "Error while generating report");
        }
        info!("Order processed with try-catch successfully!");
        Ok(())
    })
}

fn requires_new_no_catch(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        save_order(scope, "Laptop")?;
        scope.run(Propagation::RequiresNew, generate_report)?;
        info!("Order processed without try-catch successfully!");
        Ok(())
    })
}

fn supports_with_transaction(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        update_status(scope, "PROCESSING")?;
        if let Err(err) = scope.run(Propagation::Supports, |scope| send_notification(scope, true)) {
            info!(error = %err, "Notification error handled");
        }
        if let Err(err) = save_report(scope) {
            info!(error = %err, "Report saving error");
        }
        Ok(())
    })
}

fn supports_without_transaction(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Supports, |scope| {
        update_status(scope, "PROCESSING")?;
        scope.run(Propagation::Supports, |scope| send_notification(scope, true))?;
        if let Err(err) = save_report(scope) {
            info!(error = %err, "Report saving error");
        }
        Ok(())
    })
}

fn notification_then_failure(h: &TestHarness, notification_mode: Propagation) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        update_status(scope, "PROCESSING")?;
        scope.run(notification_mode, |scope| send_notification(scope, false))?;
        Err(PropagationError::operation("Simulated error after notification!"))
    })
}

fn not_supported_notification(h: &TestHarness) -> PropagationResult<()> {
    notification_then_failure(h, Propagation::NotSupported)
}

fn supports_notification(h: &TestHarness) -> PropagationResult<()> {
    notification_then_failure(h, Propagation::Supports)
}

fn never_inside_transaction(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Required, |scope| {
        info!("Performing transactional operation...");
        scope.run(Propagation::Never, |scope| {
            save_setting(scope, "maintenance_mode", "on")
        })
    })
}

fn never_standalone(h: &TestHarness) -> PropagationResult<()> {
    h.run(Propagation::Never, |scope| save_setting(scope, "app_theme", "dark"))
}

fn mandatory_inside_transaction(h: &TestHarness) -> PropagationResult<()> {
    h.seed(keys::order(ORDER_ID), "NEW");
    h.run(Propagation::Required, |scope| {
        scope.run(Propagation::Mandatory, |scope| {
            update_existing_order(scope, "COMPLETED")
        })?;
        scope.run(Propagation::Mandatory, |scope| create_sales_report(scope, 1200.0))
    })
}

fn mandatory_standalone(h: &TestHarness) -> PropagationResult<()> {
    h.seed(keys::order(ORDER_ID), "NEW");
    h.run(Propagation::Mandatory, |scope| {
        update_existing_order(scope, "COMPLETED")
    })
}

fn process_with_nested(h: &TestHarness, history_fails: bool, log_fails: bool) -> PropagationResult<()> {
    h.seed(keys::order(ORDER_ID), "NEW");
    h.run(Propagation::Required, |scope| {
        scope.run(Propagation::Required, |scope| {
            update_existing_order(scope, "PROCESSING")
        })?;
        if let Err(err) = scope.run(Propagation::Nested, |scope| {
            record_history(scope, "PROCESSING", history_fails)
        }) {
            info!(error = %err, "History error handled");
        }
        if let Err(err) = scope.run(Propagation::Nested, |scope| {
            log_status(scope, "PROCESSING", log_fails)
        }) {
            info!(error = %err, "Log error handled");
        }
        Ok(())
    })
}

fn nested_history_fails(h: &TestHarness) -> PropagationResult<()> {
    process_with_nested(h, true, false)
}

fn nested_log_fails(h: &TestHarness) -> PropagationResult<()> {
    process_with_nested(h, false, true)
}
