//! Uncaught failure handling.
//!
//! Schedulers route every uncaught task failure to an
//! [`UncaughtFailureHandler`]. A [`FailureCapture`] is a handler that also
//! records what it receives so teardown can report it; [`FailureCollector`]
//! is the implementation. When nothing is recording, failures land on the
//! [`LoggingFailureHandler`].

mod collector;

pub use collector::FailureCollector;

use crate::error::AggregatedTestFailure;
use crate::types::{CapturedFailure, FailureContext, TaskFailure};
use core::fmt;

/// Receives one uncaught failure from the given context.
pub trait UncaughtFailureHandler: Send + Sync + fmt::Debug {
    /// Handles a failure. Must not panic.
    fn handle_failure(&self, context: FailureContext, failure: TaskFailure);
}

/// Aggregation of uncaught failures for single-point reporting at teardown.
pub trait FailureCapture: UncaughtFailureHandler {
    /// Returns the failures captured so far, in arrival order.
    fn snapshot(&self) -> Vec<CapturedFailure>;

    /// Closes the capture window.
    ///
    /// Returns the first captured failure as the error; later failures are
    /// logged and attached to it, never raised on their own.
    fn finalize(&self) -> Result<(), AggregatedTestFailure>;
}

/// Fallback handler that logs each failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureHandler;

impl UncaughtFailureHandler for LoggingFailureHandler {
    fn handle_failure(&self, context: FailureContext, failure: TaskFailure) {
        tracing::error!(
            context = %context,
            failure = %failure,
            "uncaught task failure"
        );
    }
}
