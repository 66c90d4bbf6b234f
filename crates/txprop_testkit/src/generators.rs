//! Property-based test generators using proptest.
//!
//! Provides strategies for propagation modes and for random call plans:
//! trees of operations, each declared with a mode, that write, call
//! children, optionally swallow child failures and optionally fail.

use proptest::prelude::*;
use txprop_core::{
    EntityKey, Propagation, PropagationError, PropagationResult, Scope, TransactionManager,
};

/// Strategy for generating propagation modes.
pub fn propagation_strategy() -> impl Strategy<Value = Propagation> + Clone {
    prop::sample::select(Propagation::ALL.to_vec())
}

/// Strategy for modes that never reject a call.
pub fn lenient_propagation_strategy() -> impl Strategy<Value = Propagation> + Clone {
    prop::sample::select(vec![
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Nested,
    ])
}

/// One operation in a call chain.
#[derive(Debug, Clone)]
pub struct CallPlan {
    /// Declared mode.
    pub mode: Propagation,
    /// Writes issued before calling children.
    pub writes: usize,
    /// Whether the body fails after its children ran.
    pub fails: bool,
    /// Whether child failures are caught instead of propagated.
    pub catch_failures: bool,
    /// Child operations, called in order.
    pub children: Vec<CallPlan>,
}

impl CallPlan {
    /// Creates a plan with no children.
    pub fn leaf(mode: Propagation, writes: usize, fails: bool) -> Self {
        Self {
            mode,
            writes,
            fails,
            catch_failures: false,
            children: Vec::new(),
        }
    }

    /// Returns the number of operations in the plan.
    pub fn frame_count(&self) -> usize {
        1 + self.children.iter().map(CallPlan::frame_count).sum::<usize>()
    }

    /// Returns true if any operation in the plan uses `mode`.
    pub fn uses(&self, mode: Propagation) -> bool {
        self.mode == mode || self.children.iter().any(|child| child.uses(mode))
    }
}

/// Strategy for generating call plans over `modes`.
pub fn call_plan_with_modes<S>(modes: S) -> impl Strategy<Value = CallPlan>
where
    S: Strategy<Value = Propagation> + Clone + 'static,
{
    let leaf = (modes.clone(), 0..3usize, prop::bool::weighted(0.3))
        .prop_map(|(mode, writes, fails)| CallPlan::leaf(mode, writes, fails));

    leaf.prop_recursive(4, 24, 3, move |inner| {
        (
            modes.clone(),
            0..3usize,
            prop::bool::weighted(0.2),
            any::<bool>(),
            prop::collection::vec(inner, 0..3),
        )
            .prop_map(|(mode, writes, fails, catch_failures, children)| CallPlan {
                mode,
                writes,
                fails,
                catch_failures,
                children,
            })
    })
}

/// Strategy for generating call plans over all modes.
pub fn call_plan_strategy() -> impl Strategy<Value = CallPlan> {
    call_plan_with_modes(propagation_strategy())
}

/// What happened when a plan was executed.
#[derive(Debug)]
pub struct PlanRun {
    /// Result of the top-level call.
    pub result: PropagationResult<()>,
    /// Bodies that actually ran.
    pub frames_entered: usize,
    /// Writes issued, successful or not.
    pub writes_issued: usize,
    /// Child calls after which the caller's context had changed.
    pub restoration_violations: usize,
}

#[derive(Debug, Default)]
struct Tally {
    frames: usize,
    writes: usize,
    violations: usize,
}

/// Executes `plan` as a top-level call chain on `manager`.
///
/// Every write goes to a distinct key in the `plan` collection, numbered
/// in issue order starting from 1.
pub fn execute_plan(manager: &TransactionManager, plan: &CallPlan) -> PlanRun {
    let mut tally = Tally::default();
    let result = manager.run(plan.mode, |scope| run_frame(scope, plan, &mut tally));
    PlanRun {
        result,
        frames_entered: tally.frames,
        writes_issued: tally.writes,
        restoration_violations: tally.violations,
    }
}

/// Key of the `n`th write issued by [`execute_plan`].
pub fn plan_key(n: usize) -> EntityKey {
    EntityKey::new("plan", n.to_string())
}

fn run_frame(scope: &mut Scope<'_>, plan: &CallPlan, tally: &mut Tally) -> PropagationResult<()> {
    tally.frames += 1;
    for _ in 0..plan.writes {
        tally.writes += 1;
        scope.put(plan_key(tally.writes), "w")?;
    }

    for child in &plan.children {
        let before = scope.context_id();
        let result = scope.run(child.mode, |inner| run_frame(inner, child, tally));
        if scope.context_id() != before {
            tally.violations += 1;
        }
        if let Err(err) = result {
            if !plan.catch_failures {
                return Err(err);
            }
        }
    }

    if plan.fails {
        return Err(PropagationError::operation("planned failure"));
    }
    Ok(())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Picks a preset from the `TXPROP_PROPTEST` environment variable
    /// (`quick` or `thorough`), falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("TXPROP_PROPTEST").as_deref() {
            Ok("quick") => Self::quick(),
            Ok("thorough") => Self::thorough(),
            _ => Self::default(),
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use txprop_core::InMemoryStore;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn plans_stay_within_size_limits(plan in call_plan_strategy()) {
            prop_assert!(plan.frame_count() >= 1);
            prop_assert!(plan.writes < 3);
        }

        #[test]
        fn lenient_modes_never_reject(mode in lenient_propagation_strategy()) {
            prop_assert!(mode != Propagation::Mandatory);
            prop_assert!(mode != Propagation::Never);
        }
    }

    #[test]
    fn presets_scale_case_counts() {
        assert!(PropTestConfig::quick().cases < PropTestConfig::default().cases);
        assert!(PropTestConfig::thorough().cases > PropTestConfig::default().cases);
        assert_eq!(PropTestConfig::thorough().to_proptest_config().cases, 1024);
    }

    #[test]
    fn execute_plan_counts_frames_and_writes() {
        let tm = TransactionManager::new(Arc::new(InMemoryStore::new()));
        let plan = CallPlan {
            mode: Propagation::Required,
            writes: 1,
            fails: false,
            catch_failures: false,
            children: vec![
                CallPlan::leaf(Propagation::RequiresNew, 2, false),
                CallPlan::leaf(Propagation::Supports, 0, false),
            ],
        };

        let run = execute_plan(&tm, &plan);
        assert!(run.result.is_ok());
        assert_eq!(run.frames_entered, 3);
        assert_eq!(run.writes_issued, 3);
        assert_eq!(run.restoration_violations, 0);
        assert!(plan.uses(Propagation::Supports));
        assert!(!plan.uses(Propagation::Never));
    }

    #[test]
    fn uncaught_child_failure_stops_siblings() {
        let tm = TransactionManager::new(Arc::new(InMemoryStore::new()));
        let plan = CallPlan {
            mode: Propagation::Required,
            writes: 0,
            fails: false,
            catch_failures: false,
            children: vec![
                CallPlan::leaf(Propagation::Required, 1, true),
                CallPlan::leaf(Propagation::Required, 1, false),
            ],
        };

        let run = execute_plan(&tm, &plan);
        assert!(run.result.is_err());
        assert_eq!(run.frames_entered, 2);
    }
}
