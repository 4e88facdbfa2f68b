//! The test-facing scope handle.

use super::{ScopeConfig, SchedulerControl};
use crate::capture::{
    FailureCapture, FailureCollector, LoggingFailureHandler, UncaughtFailureHandler,
};
use crate::error::{Capability, CleanupError, ConfigurationError};
use crate::lab::LabScheduler;
use crate::types::{CapturedFailure, FailureContext, TaskFailure, TaskId, Time};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A scope that runs test tasks on a scheduler and reports their failures.
///
/// Lifecycle: constructed, then running (tasks may be launched), then
/// cleaned up. [`cleanup`](Self::cleanup) is the only way out of running and
/// only the first call does any work.
#[derive(Debug)]
pub struct TestScope {
    scheduler: Arc<dyn SchedulerControl>,
    capture: Option<Arc<dyn FailureCapture>>,
    /// Where task failures go when no aggregator is configured.
    fallback: Arc<dyn UncaughtFailureHandler>,
    cleaned_up: AtomicBool,
}

impl TestScope {
    /// Builds a scope from `config`.
    ///
    /// Exactly one element must provide scheduler control, and at most one
    /// may provide failure capture.
    pub fn new(config: ScopeConfig) -> Result<Self, ConfigurationError> {
        let scheduler = single(config.schedulers(), Capability::SchedulerControl)?
            .ok_or(ConfigurationError::MissingCapability(
                Capability::SchedulerControl,
            ))?;
        let capture = single(config.failure_captures(), Capability::FailureCapture)?;
        tracing::debug!(
            scheduler = ?scheduler,
            failure_capture = capture.is_some(),
            "test scope created"
        );
        Ok(Self {
            scheduler,
            capture,
            fallback: Arc::new(LoggingFailureHandler),
            cleaned_up: AtomicBool::new(false),
        })
    }

    /// Builds a scope over a fresh [`LabScheduler`] and [`FailureCollector`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            scheduler: Arc::new(LabScheduler::default()),
            capture: Some(Arc::new(FailureCollector::new())),
            fallback: Arc::new(LoggingFailureHandler),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// The scheduler-control capability this scope drives.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn SchedulerControl> {
        &self.scheduler
    }

    /// The failure aggregator, if one was configured.
    #[must_use]
    pub fn failure_capture(&self) -> Option<&Arc<dyn FailureCapture>> {
        self.capture.as_ref()
    }

    /// Failures captured so far, or an empty list without an aggregator.
    ///
    /// Kept for introspection; tests should rely on [`cleanup`](Self::cleanup)
    /// raising the first failure instead.
    #[must_use]
    pub fn captured_failures(&self) -> Vec<CapturedFailure> {
        self.capture
            .as_ref()
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    /// Launches a task; its uncaught failure is captured by this scope.
    pub fn spawn<F, E>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.launch(None, future)
    }

    /// Launches a named task; its uncaught failure is captured by this scope.
    pub fn spawn_named<F, E>(&self, name: impl Into<String>, future: F) -> TaskId
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.launch(Some(name.into()), future)
    }

    fn launch<F, E>(&self, name: Option<String>, future: F) -> TaskId
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let handler: Arc<dyn UncaughtFailureHandler> = match &self.capture {
            Some(capture) => Arc::new(CaptureHandler(Arc::clone(capture))),
            None => Arc::clone(&self.fallback),
        };
        let task = Box::pin(async move { future.await.map_err(TaskFailure::error) });
        self.scheduler.spawn_boxed(name, task, handler)
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Advances virtual time by `delta`.
    pub fn advance_time_by(&self, delta: Duration) -> Duration {
        self.scheduler.advance_time_by(delta)
    }

    /// Advances virtual time to `target`.
    pub fn advance_time_to(&self, target: Time) {
        self.scheduler.advance_time_to(target);
    }

    /// Advances virtual time until no timers remain.
    pub fn advance_until_idle(&self) -> Duration {
        self.scheduler.advance_until_idle()
    }

    /// Runs everything runnable at the current virtual time.
    pub fn run_current(&self) -> usize {
        self.scheduler.run_current()
    }

    /// Runs `f` with the scheduler paused, then resumes it.
    ///
    /// Work launched inside `f` is queued and runs on resume.
    pub fn paused<R>(&self, f: impl FnOnce() -> R) -> R {
        self.scheduler.pause();
        let _resume = ResumeOnDrop(self.scheduler.as_ref());
        f()
    }

    /// Returns true once [`cleanup`](Self::cleanup) has been called.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    /// Tears the scope down.
    ///
    /// First finalizes the aggregator: if any task failed, the first failure
    /// is returned and the scheduler is not consulted. Otherwise asks the
    /// scheduler to confirm no work is queued or due. A second call returns
    /// [`CleanupError::AlreadyCleanedUp`] without doing anything.
    pub fn cleanup(&self) -> Result<(), CleanupError> {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return Err(CleanupError::AlreadyCleanedUp);
        }
        if let Some(capture) = &self.capture {
            capture.finalize()?;
        }
        self.scheduler.cleanup()?;
        tracing::debug!(now = %self.scheduler.now(), "test scope cleaned up");
        Ok(())
    }
}

/// Resumes the scheduler even if the paused section unwinds.
struct ResumeOnDrop<'a>(&'a dyn SchedulerControl);

impl Drop for ResumeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.resume();
    }
}

/// Routes task failures into the scope's aggregator.
#[derive(Debug)]
struct CaptureHandler(Arc<dyn FailureCapture>);

impl UncaughtFailureHandler for CaptureHandler {
    fn handle_failure(&self, context: FailureContext, failure: TaskFailure) {
        self.0.handle_failure(context, failure);
    }
}

/// Returns the only element of `found`, `None` if empty, or an ambiguity error.
fn single<T>(mut found: Vec<T>, capability: Capability) -> Result<Option<T>, ConfigurationError> {
    match found.len() {
        0 | 1 => Ok(found.pop()),
        count => Err(ConfigurationError::AmbiguousCapability { capability, count }),
    }
}
