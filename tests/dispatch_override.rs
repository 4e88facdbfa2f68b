//! Integration tests for the process-wide default dispatcher override.
//!
//! The override slot is process state, so every test here holds
//! `SLOT_LOCK` for its whole body.

mod common;
use common::*;

use labscope::dispatch::{self, Dispatch, ThreadDispatcher};
use labscope::lab::{LabConfig, LabScheduler};
use labscope::scope::SchedulerControl;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

static SLOT_LOCK: Mutex<()> = Mutex::new(());

/// Resets the slot even if the test body panics.
struct ResetOnDrop;

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        dispatch::reset_default();
    }
}

#[test]
fn platform_default_when_not_overridden() {
    let _slot = SLOT_LOCK.lock();
    init_test_logging();
    test_phase!("platform_default_when_not_overridden");

    dispatch::reset_default();
    assert!(!dispatch::is_overridden());
    assert_eq!(dispatch::current().name(), ThreadDispatcher.name());

    let (tx, rx) = mpsc::channel();
    dispatch::current().dispatch(Box::new(move || {
        let _ = tx.send(7_u32);
    }));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));

    test_complete!("platform_default_when_not_overridden");
}

#[test]
fn lab_override_runs_dispatched_work_on_virtual_time() {
    let _slot = SLOT_LOCK.lock();
    init_test_logging();
    test_phase!("lab_override_runs_dispatched_work_on_virtual_time");

    let lab = LabScheduler::new(LabConfig::new().paused(true));
    dispatch::set_default(Arc::new(lab.clone()));
    let _reset = ResetOnDrop;

    assert!(dispatch::is_overridden());
    assert_eq!(dispatch::current().name(), "lab");

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        dispatch::current().dispatch(Box::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert_with_log!(
        ran.load(Ordering::SeqCst) == 0,
        "paused lab holds dispatched jobs",
        0,
        ran.load(Ordering::SeqCst)
    );
    assert_eq!(lab.queued_count(), 3);

    lab.resume();
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert!(lab.cleanup().is_ok());

    test_complete!("lab_override_runs_dispatched_work_on_virtual_time");
}

#[test]
fn reset_restores_platform_default() {
    let _slot = SLOT_LOCK.lock();
    init_test_logging();
    test_phase!("reset_restores_platform_default");

    let first = LabScheduler::default();
    let second = LabScheduler::default();
    dispatch::set_default(Arc::new(first));
    dispatch::set_default(Arc::new(second.clone()));

    // The latest override wins.
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    dispatch::current().dispatch(Box::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(second.is_idle());

    dispatch::reset_default();
    assert!(!dispatch::is_overridden());
    assert_eq!(dispatch::current().name(), "thread");

    // Resetting twice is harmless.
    dispatch::reset_default();
    assert!(!dispatch::is_overridden());

    test_complete!("reset_restores_platform_default");
}
