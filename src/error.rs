//! Error types for scope construction and teardown.
//!
//! Teardown reports at most one error, chosen in this order:
//!
//! - [`AggregatedTestFailure`]: a task failed; carries the first failure
//! - [`PendingWorkError`]: the scheduler still had runnable work
//! - [`CleanupError::AlreadyCleanedUp`]: teardown ran twice
//!
//! Construction fails only with [`ConfigurationError`].

use crate::types::{CapturedFailure, Time};
use core::fmt;
use thiserror::Error;

/// A capability a [`TestScope`](crate::scope::TestScope) resolves from its
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Virtual-time and task control.
    SchedulerControl,
    /// Uncaught-failure aggregation.
    FailureCapture,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchedulerControl => f.write_str("scheduler control"),
            Self::FailureCapture => f.write_str("failure capture"),
        }
    }
}

/// Raised when a scope cannot be built from its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No element of the configuration provides the capability.
    #[error("scope configuration does not provide {0}")]
    MissingCapability(Capability),
    /// More than one element provides the capability.
    #[error("scope configuration provides {capability} {count} times; expected at most one")]
    AmbiguousCapability {
        /// The capability that was provided more than once.
        capability: Capability,
        /// How many elements provided it.
        count: usize,
    },
}

/// The first uncaught task failure, raised at finalize.
///
/// The remaining failures have already been logged when this is returned;
/// they are kept here for inspection and never re-raised.
#[derive(Debug, Clone)]
pub struct AggregatedTestFailure {
    first: CapturedFailure,
    suppressed: Vec<CapturedFailure>,
}

impl AggregatedTestFailure {
    pub(crate) fn new(first: CapturedFailure, suppressed: Vec<CapturedFailure>) -> Self {
        Self { first, suppressed }
    }

    /// The first failure, in arrival order.
    #[must_use]
    pub fn first(&self) -> &CapturedFailure {
        &self.first
    }

    /// Failures that arrived after the first one.
    #[must_use]
    pub fn suppressed(&self) -> &[CapturedFailure] {
        &self.suppressed
    }

    /// Consumes the error, returning the first failure.
    #[must_use]
    pub fn into_first(self) -> CapturedFailure {
        self.first
    }
}

impl fmt::Display for AggregatedTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uncaught failure in test: {}", self.first)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} more reported)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedTestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.first.failure)
    }
}

/// The scheduler still had runnable work at teardown.
///
/// Tasks suspended on a timer whose deadline is still in the future are not
/// counted; only work that could have run at the current virtual time is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unfinished tasks at teardown (time {now}): {queued} queued, {due_timers} due timers; \
     ensure all tasks are completed or cancelled by the test"
)]
pub struct PendingWorkError {
    /// Virtual time when the check ran.
    pub now: Time,
    /// Tasks sitting in the ready queue.
    pub queued: usize,
    /// Timers whose deadline has already passed but that were never fired.
    pub due_timers: usize,
}

/// Raised by [`TestScope::cleanup`](crate::scope::TestScope::cleanup).
#[derive(Debug, Clone, Error)]
pub enum CleanupError {
    /// A task failed during the test.
    #[error(transparent)]
    Failure(#[from] AggregatedTestFailure),
    /// Work was left behind on the scheduler.
    #[error(transparent)]
    PendingWork(#[from] PendingWorkError),
    /// Teardown already ran for this scope.
    #[error("test scope was already cleaned up")]
    AlreadyCleanedUp,
}

impl CleanupError {
    /// Returns the first captured failure, if this is a task failure.
    #[must_use]
    pub fn as_failure(&self) -> Option<&AggregatedTestFailure> {
        match self {
            Self::Failure(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the pending-work report, if this is a pending-work error.
    #[must_use]
    pub fn as_pending_work(&self) -> Option<&PendingWorkError> {
        match self {
            Self::PendingWork(p) => Some(p),
            _ => None,
        }
    }
}
