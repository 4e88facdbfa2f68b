//! E2E tests for test-scope teardown.
//!
//! Tests the full path: tasks launched through a `TestScope` on a
//! `LabScheduler`, failures routed into the `FailureCollector`, and the
//! combined cleanup verdict (first failure, then leftover work, then clean).

mod common;
use common::*;

use labscope::capture::FailureCapture;
use labscope::error::CleanupError;
use labscope::lab::LabConfig;
use labscope::scope::SchedulerControl;
use labscope::types::Time;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn messages(fixture: &ScopeFixture) -> Vec<String> {
    fixture
        .scope
        .captured_failures()
        .iter()
        .map(|f| f.failure.to_string())
        .collect()
}

// ==================== Clean teardown ====================

#[test]
fn e2e_clean_scope_tears_down() {
    init_test_logging();
    test_phase!("e2e_clean_scope_tears_down");

    let fixture = scope_fixture(LabConfig::default());
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let done = Arc::clone(&done);
        fixture.scope.spawn(async move {
            done.fetch_add(1, Ordering::SeqCst);
            Ok::<(), Infallible>(())
        });
    }

    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert!(fixture.scope.cleanup().is_ok());
    assert!(fixture.scope.is_cleaned_up());

    test_complete!("e2e_clean_scope_tears_down");
}

#[test]
fn e2e_suspended_on_unreached_timer_is_clean() {
    init_test_logging();
    test_phase!("e2e_suspended_on_unreached_timer_is_clean");

    let fixture = scope_fixture(LabConfig::default());
    let lab = fixture.lab.clone();
    fixture.scope.spawn_named("long-sleeper", async move {
        lab.sleep(Duration::from_secs(3_600)).await;
        Ok::<(), Infallible>(())
    });

    assert_eq!(fixture.lab.live_task_count(), 1);
    assert_eq!(fixture.lab.timer_count(), 1);
    assert!(
        fixture.scope.cleanup().is_ok(),
        "a task parked on a future timer is not unfinished work"
    );

    test_complete!("e2e_suspended_on_unreached_timer_is_clean");
}

// ==================== Failure capture ====================

#[test]
fn e2e_first_failure_raised_second_reported() {
    init_test_logging();
    test_phase!("e2e_first_failure_raised_second_reported");

    let fixture = scope_fixture(LabConfig::default());
    fixture
        .scope
        .spawn_named("a", async { Err::<(), _>(TestError::new("A")) });
    fixture
        .scope
        .spawn_named("b", async { Err::<(), _>(TestError::new("B")) });

    assert_eq!(
        messages(&fixture),
        ["task failed: TestError: A", "task failed: TestError: B"]
    );

    let err = fixture.scope.cleanup().unwrap_err();
    let failure = err.as_failure().expect("aggregated failure");
    assert_eq!(
        failure.first().failure.to_string(),
        "task failed: TestError: A"
    );
    assert_eq!(failure.first().context.task_name.as_deref(), Some("a"));
    let suppressed: Vec<_> = failure
        .suppressed()
        .iter()
        .map(|f| f.failure.to_string())
        .collect();
    assert_eq!(suppressed, ["task failed: TestError: B"]);

    test_complete!("e2e_first_failure_raised_second_reported");
}

#[test]
fn e2e_panic_in_task_is_captured_not_propagated() {
    init_test_logging();
    test_phase!("e2e_panic_in_task_is_captured_not_propagated");

    let fixture = scope_fixture(LabConfig::default());
    let lab = fixture.lab.clone();
    fixture.scope.spawn(async move {
        lab.sleep(Duration::from_millis(10)).await;
        if lab.now() >= Time::from_millis(10) {
            panic!("sensor buffer exhausted");
        }
        Ok::<(), Infallible>(())
    });

    fixture.scope.advance_time_by(Duration::from_millis(10));
    let captured = fixture.scope.captured_failures();
    assert_eq!(captured.len(), 1);
    assert!(captured[0].failure.is_panic());
    assert_eq!(
        captured[0].failure.to_string(),
        "task panicked: sensor buffer exhausted"
    );
    assert_eq!(captured[0].context.at, Time::from_millis(10));

    let err = fixture.scope.cleanup().unwrap_err();
    assert!(err.as_failure().is_some());

    test_complete!("e2e_panic_in_task_is_captured_not_propagated");
}

#[test]
fn e2e_failure_skips_pending_work_check() {
    init_test_logging();
    test_phase!("e2e_failure_skips_pending_work_check");

    let fixture = scope_fixture(LabConfig::new().paused(true));
    fixture.scope.spawn(async { Ok::<(), Infallible>(()) });
    fixture.scope.spawn(async { Err::<(), _>(TestError::new("late")) });
    fixture.scope.run_current();
    // Leave one more task queued behind the failure.
    fixture.scope.spawn(async { Ok::<(), Infallible>(()) });
    assert_eq!(fixture.lab.queued_count(), 1);

    let err = fixture.scope.cleanup().unwrap_err();
    assert!(
        matches!(err, CleanupError::Failure(_)),
        "failure must win over pending work, got {err:?}"
    );

    test_complete!("e2e_failure_skips_pending_work_check");
}

// ==================== Pending work ====================

#[test]
fn e2e_queued_work_fails_teardown() {
    init_test_logging();
    test_phase!("e2e_queued_work_fails_teardown");

    let fixture = scope_fixture(LabConfig::new().paused(true));
    fixture.scope.spawn(async { Ok::<(), Infallible>(()) });
    fixture.scope.spawn(async { Ok::<(), Infallible>(()) });

    let err = fixture.scope.cleanup().unwrap_err();
    let pending = err.as_pending_work().expect("pending work");
    assert_eq!(pending.queued, 2);
    assert!(err.to_string().contains("unfinished tasks"));

    test_complete!("e2e_queued_work_fails_teardown");
}

#[test]
fn e2e_scheduler_double_sees_no_cleanup_after_failure() {
    init_test_logging();
    test_phase!("e2e_scheduler_double_sees_no_cleanup_after_failure");

    let recorder = Arc::new(RecordingScheduler::new());
    let collector = Arc::new(labscope::FailureCollector::new());
    let scope = labscope::TestScope::new(
        labscope::ScopeConfig::new()
            .with_scheduler(Arc::clone(&recorder) as Arc<dyn SchedulerControl>)
            .with_failure_capture(Arc::clone(&collector) as Arc<dyn FailureCapture>),
    )
    .expect("scope");

    collector.capture(
        labscope::FailureContext::default(),
        labscope::TaskFailure::panicked("boom"),
    );
    assert!(scope.cleanup().is_err());
    assert!(!recorder.cleanup_called());

    test_complete!("e2e_scheduler_double_sees_no_cleanup_after_failure");
}

// ==================== After teardown ====================

#[test]
fn e2e_failure_after_teardown_goes_to_fallback() {
    init_test_logging();
    test_phase!("e2e_failure_after_teardown_goes_to_fallback");

    let fixture = scope_fixture(LabConfig::default());
    let lab = fixture.lab.clone();
    fixture.scope.spawn_named("straggler", async move {
        lab.sleep(Duration::from_secs(1)).await;
        Err::<(), _>(TestError::new("too late"))
    });
    assert!(fixture.scope.cleanup().is_ok());

    fixture.lab.advance_time_by(Duration::from_secs(1));

    assert!(fixture.scope.captured_failures().is_empty());
    assert!(fixture.collector.is_finalized());
    assert_eq!(
        fixture.fallback.messages(),
        ["task failed: TestError: too late"]
    );
    assert!(matches!(
        fixture.scope.cleanup(),
        Err(CleanupError::AlreadyCleanedUp)
    ));

    test_complete!("e2e_failure_after_teardown_goes_to_fallback");
}

#[test]
fn e2e_virtual_time_drives_interleaving() {
    init_test_logging();
    test_phase!("e2e_virtual_time_drives_interleaving");

    let fixture = scope_fixture(LabConfig::default());
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for (name, period_ms, rounds) in [("fast", 10_u64, 3_u32), ("slow", 25, 2)] {
        let lab = fixture.lab.clone();
        let log = Arc::clone(&log);
        fixture.scope.spawn_named(name, async move {
            for _ in 0..rounds {
                lab.sleep(Duration::from_millis(period_ms)).await;
                log.lock().push((name, lab.now().as_millis()));
            }
            Ok::<(), Infallible>(())
        });
    }

    let elapsed = fixture.scope.advance_until_idle();
    assert_eq!(elapsed, Duration::from_millis(50));
    assert_eq!(
        *log.lock(),
        [
            ("fast", 10),
            ("fast", 20),
            ("slow", 25),
            ("fast", 30),
            ("slow", 50)
        ]
    );
    assert!(fixture.scope.cleanup().is_ok());

    test_complete!("e2e_virtual_time_drives_interleaving");
}

#[test]
fn e2e_concurrent_spawns_through_scope_tear_down_clean() {
    init_test_logging();
    test_phase!("e2e_concurrent_spawns_through_scope_tear_down_clean");

    const THREADS: usize = 4;
    const PER_THREAD: usize = 20;

    for _ in 0..100 {
        let fixture = scope_fixture(LabConfig::default());
        let done = Arc::new(AtomicUsize::new(0));
        let barrier = std::sync::Barrier::new(THREADS);
        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        let done = Arc::clone(&done);
                        fixture.scope.spawn(async move {
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), Infallible>(())
                        });
                    }
                });
            }
        });

        let ran = done.load(Ordering::SeqCst);
        assert_with_log!(
            ran == THREADS * PER_THREAD,
            "every eager spawn ran",
            THREADS * PER_THREAD,
            ran
        );
        assert_eq!(fixture.lab.queued_count(), 0);
        assert!(fixture.scope.cleanup().is_ok());
    }

    test_complete!("e2e_concurrent_spawns_through_scope_tear_down_clean");
}
