//! Call chains on separate threads sharing one manager.

use std::sync::Barrier;
use std::thread;
use txprop_testkit::prelude::*;

const THREADS: usize = 8;

#[test]
fn concurrent_chains_keep_their_own_context() {
    let h = TestHarness::new();
    let inside = Barrier::new(THREADS);
    let checked = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let h = &h;
            let inside = &inside;
            let checked = &checked;
            s.spawn(move || {
                let result: PropagationResult<()> = h.run(Propagation::Required, |scope| {
                    let own = scope.context_id();
                    scope.put(EntityKey::new("thread", t.to_string()), "started")?;

                    inside.wait();
                    assert_eq!(h.active_count(), THREADS);
                    checked.wait();

                    scope.run(Propagation::RequiresNew, |inner| {
                        inner.put(EntityKey::new("audit", t.to_string()), "seen")
                    })?;
                    assert_eq!(scope.context_id(), own);
                    assert_eq!(scope.pending_writes(), 1);

                    if t % 2 == 1 {
                        return Err(PropagationError::operation("odd thread fails"));
                    }
                    Ok(())
                });
                assert_eq!(result.is_ok(), t % 2 == 0);
            });
        }
    });

    assert_eq!(h.active_count(), 0);
    for t in 0..THREADS {
        assert!(h.contains(&EntityKey::new("audit", t.to_string())));
        assert_eq!(
            h.contains(&EntityKey::new("thread", t.to_string())),
            t % 2 == 0
        );
    }
    assert_eq!(h.stats().contexts_begun(), (THREADS * 2) as u64);
}

#[test]
fn detached_chains_interleave_auto_commits() {
    let h = TestHarness::new();

    thread::scope(|s| {
        for t in 0..THREADS {
            let h = &h;
            s.spawn(move || {
                h.run(Propagation::NotSupported, |scope| {
                    for n in 0..10 {
                        scope.put(EntityKey::new(format!("t{t}"), n.to_string()), "x")?;
                    }
                    Ok(())
                })
                .unwrap();
            });
        }
    });

    assert_eq!(h.store.len(), THREADS * 10);
    assert_eq!(h.store.commit_log().len(), THREADS * 10);
    assert_eq!(h.stats().auto_commits(), (THREADS * 10) as u64);
}
