//! Property tests over random call plans.

use proptest::prelude::*;
use txprop_testkit::prelude::*;

fn without_failures(mut plan: CallPlan) -> CallPlan {
    plan.fails = false;
    plan.children = plan.children.into_iter().map(without_failures).collect();
    plan
}

fn has_failure(plan: &CallPlan) -> bool {
    plan.fails || plan.children.iter().any(has_failure)
}

proptest! {
    #![proptest_config(PropTestConfig::from_env().to_proptest_config())]

    #[test]
    fn no_context_outlives_its_call(plan in call_plan_strategy()) {
        let h = TestHarness::new();
        let run = execute_plan(&h, &plan);

        prop_assert_eq!(h.active_count(), 0);
        prop_assert_eq!(run.restoration_violations, 0);
        prop_assert!(h.store.len() <= run.writes_issued);
    }

    #[test]
    fn failure_free_lenient_plans_make_every_write_durable(
        plan in call_plan_with_modes(lenient_propagation_strategy()).prop_map(without_failures)
    ) {
        let h = TestHarness::new();
        let run = execute_plan(&h, &plan);

        prop_assert!(run.result.is_ok());
        prop_assert_eq!(run.frames_entered, plan.frame_count());
        prop_assert_eq!(h.store.len(), run.writes_issued);
    }

    #[test]
    fn required_only_plans_are_atomic(
        plan in call_plan_with_modes(Just(Propagation::Required))
    ) {
        let h = TestHarness::new();
        let run = execute_plan(&h, &plan);

        if has_failure(&plan) {
            prop_assert!(run.result.is_err());
            prop_assert!(h.store.is_empty());
        } else {
            prop_assert!(run.result.is_ok());
            prop_assert_eq!(h.store.len(), run.writes_issued);
        }
        prop_assert!(h.stats().commits() <= 1);
    }

    #[test]
    fn mandatory_at_top_level_never_runs(plan in call_plan_strategy()) {
        let mut plan = plan;
        plan.mode = Propagation::Mandatory;

        let h = TestHarness::new();
        let run = execute_plan(&h, &plan);

        prop_assert!(
            matches!(run.result, Err(PropagationError::NoTransaction { .. })),
            "unexpected result: {:?}",
            run.result
        );
        prop_assert_eq!(run.frames_entered, 0);
        prop_assert!(h.store.is_empty());
    }

    #[test]
    fn detached_writes_before_failure_stay_durable(
        mode in prop::sample::select(vec![
            Propagation::Supports,
            Propagation::NotSupported,
            Propagation::Never,
        ]),
        writes in 1..16usize,
    ) {
        let h = TestHarness::new();
        let mut transactional = true;
        let result: PropagationResult<()> = h.run(mode, |scope| {
            transactional = scope.is_transactional();
            for n in 0..writes {
                scope.put(plan_key(n), "w")?;
            }
            Err(PropagationError::operation("after writes"))
        });

        prop_assert!(!transactional);
        prop_assert!(result.is_err());
        prop_assert_eq!(h.store.len(), writes);
        prop_assert_eq!(h.stats().auto_commits(), writes as u64);
    }

    #[test]
    fn requires_new_commit_survives_outer_failure(outer in 0..5usize, inner in 1..5usize) {
        let h = TestHarness::new();
        let result: PropagationResult<()> = h.run(Propagation::Required, |scope| {
            for n in 0..outer {
                scope.put(EntityKey::new("outer", n.to_string()), "o")?;
            }
            scope.run(Propagation::RequiresNew, |scope| {
                for n in 0..inner {
                    scope.put(EntityKey::new("inner", n.to_string()), "i")?;
                }
                Ok(())
            })?;
            Err(PropagationError::operation("outer failed"))
        });

        prop_assert!(result.is_err());
        prop_assert_eq!(h.store.len(), inner);
        prop_assert!(h.durable_keys().iter().all(|key| key.collection == "inner"));
    }

    #[test]
    fn not_supported_child_failure_leaves_caller_committable(
        outer in 1..5usize,
        detached in 1..5usize,
    ) {
        let h = TestHarness::new();
        h.run(Propagation::Required, |scope| {
            for n in 0..outer {
                scope.put(EntityKey::new("outer", n.to_string()), "o")?;
            }
            let child = scope.run(Propagation::NotSupported, |scope| {
                for n in 0..detached {
                    scope.put(EntityKey::new("detached", n.to_string()), "d")?;
                }
                Err::<(), _>(PropagationError::operation("detached child failed"))
            });
            assert!(child.is_err());
            assert!(!scope.is_rollback_only());
            assert_eq!(scope.pending_writes(), outer);
            Ok(())
        })
        .unwrap();

        prop_assert_eq!(h.store.len(), outer + detached);
        prop_assert_eq!(h.stats().commits(), 1);
    }

    #[test]
    fn nested_failure_only_discards_child_writes(parent in 1..5usize, child in 1..5usize) {
        let h = TestHarness::new();
        h.run(Propagation::Required, |scope| {
            for n in 0..parent {
                scope.put(EntityKey::new("parent", n.to_string()), "p")?;
            }
            let nested = scope.run(Propagation::Nested, |scope| {
                for n in 0..child {
                    scope.put(EntityKey::new("child", n.to_string()), "c")?;
                }
                Err::<(), _>(PropagationError::operation("child failed"))
            });
            assert!(nested.is_err());
            assert_eq!(scope.pending_writes(), parent);
            Ok(())
        })
        .unwrap();

        prop_assert_eq!(h.store.len(), parent);
    }

    #[test]
    fn parent_rollback_discards_released_children(child in 1..5usize) {
        let h = TestHarness::new();
        let result: PropagationResult<()> = h.run(Propagation::Required, |scope| {
            scope.run(Propagation::Nested, |scope| {
                for n in 0..child {
                    scope.put(EntityKey::new("child", n.to_string()), "c")?;
                }
                Ok(())
            })?;
            Err(PropagationError::operation("parent failed"))
        });

        prop_assert!(result.is_err());
        prop_assert!(h.store.is_empty());
    }
}
