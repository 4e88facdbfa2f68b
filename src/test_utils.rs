//! Test utilities for labscope.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A recording failure handler and a simple error type
//! - A scheduler-control double that records calls

use crate::capture::UncaughtFailureHandler;
use crate::error::PendingWorkError;
use crate::scope::{BoxedTask, SchedulerControl};
use crate::types::{FailureContext, TaskFailure, TaskId, Time};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Simple error for tasks that fail on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl TestError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::error::Error for TestError {}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestError: {}", self.0)
    }
}

/// Failure handler that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingFailureHandler {
    received: Mutex<Vec<(FailureContext, TaskFailure)>>,
}

impl RecordingFailureHandler {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered failures, in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|(_, failure)| failure.to_string())
            .collect()
    }

    /// Contexts, in arrival order.
    #[must_use]
    pub fn contexts(&self) -> Vec<FailureContext> {
        self.received.lock().iter().map(|(ctx, _)| ctx.clone()).collect()
    }
}

impl UncaughtFailureHandler for RecordingFailureHandler {
    fn handle_failure(&self, context: FailureContext, failure: TaskFailure) {
        self.received.lock().push((context, failure));
    }
}

/// Scheduler-control double that records every call and never runs tasks.
///
/// `cleanup` fails with the configured [`PendingWorkError`], if any.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<&'static str>>,
    pending: Mutex<Option<PendingWorkError>>,
    next_task: Mutex<u64>,
}

impl RecordingScheduler {
    /// Creates a double whose cleanup succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a double whose cleanup reports `queued` leftover tasks.
    #[must_use]
    pub fn with_pending(queued: usize) -> Self {
        let scheduler = Self::default();
        *scheduler.pending.lock() = Some(PendingWorkError {
            now: Time::ZERO,
            queued,
            due_timers: 0,
        });
        scheduler
    }

    /// Calls received so far, by method name.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Returns true if `cleanup` was invoked.
    #[must_use]
    pub fn cleanup_called(&self) -> bool {
        self.calls.lock().contains(&"cleanup")
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

impl SchedulerControl for RecordingScheduler {
    fn now(&self) -> Time {
        self.record("now");
        Time::ZERO
    }

    fn advance_time_by(&self, _delta: Duration) -> Duration {
        self.record("advance_time_by");
        Duration::ZERO
    }

    fn advance_time_to(&self, _target: Time) {
        self.record("advance_time_to");
    }

    fn advance_until_idle(&self) -> Duration {
        self.record("advance_until_idle");
        Duration::ZERO
    }

    fn run_current(&self) -> usize {
        self.record("run_current");
        0
    }

    fn pause(&self) {
        self.record("pause");
    }

    fn resume(&self) {
        self.record("resume");
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn spawn_boxed(
        &self,
        _name: Option<String>,
        _task: BoxedTask,
        _handler: Arc<dyn UncaughtFailureHandler>,
    ) -> TaskId {
        self.record("spawn");
        let mut next = self.next_task.lock();
        *next += 1;
        TaskId::from_raw(*next)
    }

    fn cleanup(&self) -> Result<(), PendingWorkError> {
        self.record("cleanup");
        self.pending.lock().clone().map_or(Ok(()), Err)
    }
}
