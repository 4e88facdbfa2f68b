//! Process-wide default dispatcher.
//!
//! Production code that needs to hand work off asks [`current`] for the
//! default dispatcher instead of spawning threads itself. Tests swap in a
//! [`LabScheduler`](crate::lab::LabScheduler) with [`set_default`] at setup and
//! restore the platform default with [`reset_default`] at teardown, so the
//! code under test runs on virtual time.
//!
//! # Precondition
//!
//! The slot is plain process-wide state. Neither [`set_default`] nor
//! [`reset_default`] checks whether work dispatched through the previous
//! default is still running, and tests that override the slot must not run
//! concurrently with each other. Callers own both obligations.

use core::fmt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs.
pub trait Dispatch: Send + Sync + fmt::Debug {
    /// Runs `job`, now or later, on this dispatcher.
    fn dispatch(&self, job: Job);

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// The platform default: every job runs on a fresh OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDispatcher;

impl Dispatch for ThreadDispatcher {
    fn dispatch(&self, job: Job) {
        let spawned = thread::Builder::new()
            .name("labscope-dispatch".to_string())
            .spawn(job);
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn dispatch thread");
        }
    }

    fn name(&self) -> &str {
        "thread"
    }
}

static OVERRIDE: RwLock<Option<Arc<dyn Dispatch>>> = RwLock::new(None);

/// Replaces the process-wide default dispatcher.
///
/// Every later call to [`current`], from any thread, returns `dispatcher`
/// until the next [`set_default`] or [`reset_default`]. See the module
/// docs for the unchecked precondition.
pub fn set_default(dispatcher: Arc<dyn Dispatch>) {
    tracing::debug!(dispatcher = dispatcher.name(), "default dispatcher overridden");
    *OVERRIDE.write() = Some(dispatcher);
}

/// Restores the platform default dispatcher.
///
/// Same precondition as [`set_default`].
pub fn reset_default() {
    if let Some(previous) = OVERRIDE.write().take() {
        tracing::debug!(dispatcher = previous.name(), "default dispatcher reset");
    }
}

/// Returns the current default dispatcher.
#[must_use]
pub fn current() -> Arc<dyn Dispatch> {
    OVERRIDE
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(ThreadDispatcher))
}

/// Returns true while an override is installed.
#[must_use]
pub fn is_overridden() -> bool {
    OVERRIDE.read().is_some()
}
