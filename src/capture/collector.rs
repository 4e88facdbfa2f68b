//! The failure collector.
//!
//! One lock guards both the captured sequence and the finalized flag, so an
//! append and the transition to finalized can never interleave. Once
//! finalized, new failures bypass the record and go to the fallback handler.

use super::{FailureCapture, LoggingFailureHandler, UncaughtFailureHandler};
use crate::error::AggregatedTestFailure;
use crate::types::{CapturedFailure, FailureContext, TaskFailure};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct CollectorState {
    captured: Vec<CapturedFailure>,
    finalized: bool,
}

/// Thread-safe collector of uncaught task failures.
///
/// # Example
///
/// ```
/// use labscope::capture::{FailureCapture, FailureCollector};
/// use labscope::types::{FailureContext, TaskFailure};
///
/// let collector = FailureCollector::new();
/// collector.capture(FailureContext::default(), TaskFailure::panicked("first"));
/// collector.capture(FailureContext::default(), TaskFailure::panicked("second"));
///
/// let err = collector.finalize().unwrap_err();
/// assert_eq!(err.first().failure.to_string(), "task panicked: first");
/// assert_eq!(err.suppressed().len(), 1);
/// ```
#[derive(Debug)]
pub struct FailureCollector {
    state: Mutex<CollectorState>,
    fallback: Arc<dyn UncaughtFailureHandler>,
}

impl FailureCollector {
    /// Creates a collector whose post-finalize fallback logs failures.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(LoggingFailureHandler))
    }

    /// Creates a collector that forwards post-finalize failures to `fallback`.
    #[must_use]
    pub fn with_fallback(fallback: Arc<dyn UncaughtFailureHandler>) -> Self {
        Self {
            state: Mutex::new(CollectorState::default()),
            fallback,
        }
    }

    /// Records a failure.
    ///
    /// After [`finalize`](FailureCapture::finalize) the failure is handed to
    /// the fallback handler instead and the record is left untouched.
    pub fn capture(&self, context: FailureContext, failure: TaskFailure) {
        {
            let mut state = self.state.lock();
            if !state.finalized {
                tracing::debug!(
                    context = %context,
                    failure = %failure,
                    index = state.captured.len(),
                    "captured uncaught failure"
                );
                state.captured.push(CapturedFailure { context, failure });
                return;
            }
        }
        tracing::debug!(
            context = %context,
            "failure arrived after finalize, forwarding to fallback"
        );
        self.fallback.handle_failure(context, failure);
    }

    /// Returns true once the capture window has been closed.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    /// Returns the number of captured failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().captured.len()
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().captured.is_empty()
    }
}

impl Default for FailureCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl UncaughtFailureHandler for FailureCollector {
    fn handle_failure(&self, context: FailureContext, failure: TaskFailure) {
        self.capture(context, failure);
    }
}

impl FailureCapture for FailureCollector {
    fn snapshot(&self) -> Vec<CapturedFailure> {
        self.state.lock().captured.clone()
    }

    fn finalize(&self) -> Result<(), AggregatedTestFailure> {
        let (first, suppressed) = {
            let mut state = self.state.lock();
            if state.finalized {
                return Ok(());
            }
            state.finalized = true;
            let Some((first, rest)) = state.captured.split_first() else {
                return Ok(());
            };
            (first.clone(), rest.to_vec())
        };

        for (offset, failure) in suppressed.iter().enumerate() {
            tracing::warn!(
                index = offset + 1,
                context = %failure.context,
                failure = %failure.failure,
                "suppressed uncaught failure"
            );
        }
        Err(AggregatedTestFailure::new(first, suppressed))
    }
}
