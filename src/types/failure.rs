//! Uncaught task failures and the context they surfaced in.
//!
//! A task launched on a lab scheduler can fail in two ways: its future
//! resolves to `Err`, or polling it panics. Both are turned into a
//! [`TaskFailure`] and handed to whichever
//! [`UncaughtFailureHandler`](crate::capture::UncaughtFailureHandler) the task
//! was launched with.

use super::{TaskId, Time};
use core::fmt;
use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// An uncaught failure raised by a task.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    /// The task panicked while being polled.
    Panicked {
        /// The panic message, when the payload was a string.
        message: String,
    },
    /// The task future resolved to an error.
    Error(Arc<dyn Error + Send + Sync + 'static>),
}

impl TaskFailure {
    /// Wraps an application error.
    pub fn error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Error(Arc::new(error))
    }

    /// Creates a panic failure with the given message.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }

    /// Converts a payload caught by `catch_unwind` into a failure.
    #[must_use]
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self::Panicked { message }
    }

    /// Returns true if this failure came from a panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Returns the wrapped error, if this failure is an application error.
    #[must_use]
    pub fn as_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Error(e) => Some(e.as_ref()),
            Self::Panicked { .. } => None,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panicked { message } => write!(f, "task panicked: {message}"),
            Self::Error(e) => write!(f, "task failed: {e}"),
        }
    }
}

impl Error for TaskFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Error(e) => Some(e.as_ref()),
            Self::Panicked { .. } => None,
        }
    }
}

/// Where an uncaught failure came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureContext {
    /// The failing task, if it was launched on a lab scheduler.
    pub task: Option<TaskId>,
    /// The name the task was launched with, if any.
    pub task_name: Option<String>,
    /// Virtual time at which the failure surfaced.
    pub at: Time,
}

impl FailureContext {
    /// Context for a failure raised by the given task.
    #[must_use]
    pub fn for_task(task: TaskId, task_name: Option<String>, at: Time) -> Self {
        Self {
            task: Some(task),
            task_name,
            at,
        }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.task, &self.task_name) {
            (Some(id), Some(name)) => write!(f, "{id} ({name}) at {}", self.at),
            (Some(id), None) => write!(f, "{id} at {}", self.at),
            (None, Some(name)) => write!(f, "{name} at {}", self.at),
            (None, None) => write!(f, "<external> at {}", self.at),
        }
    }
}

/// A failure together with the context it was captured in.
#[derive(Debug, Clone)]
pub struct CapturedFailure {
    /// Where the failure came from.
    pub context: FailureContext,
    /// The failure itself.
    pub failure: TaskFailure,
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.failure, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestError;

    #[test]
    fn panic_payload_str_and_string() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let failure = TaskFailure::from_panic_payload(payload.as_ref());
        assert_eq!(failure.to_string(), "task panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let failure = TaskFailure::from_panic_payload(payload.as_ref());
        assert!(failure.is_panic());
        assert_eq!(failure.to_string(), "task panicked: owned boom");

        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        let failure = TaskFailure::from_panic_payload(payload.as_ref());
        assert_eq!(failure.to_string(), "task panicked: Box<dyn Any>");
    }

    #[test]
    fn error_failure_exposes_source() {
        let failure = TaskFailure::error(TestError::new("disk full"));
        assert!(!failure.is_panic());
        assert_eq!(failure.to_string(), "task failed: TestError: disk full");
        assert!(failure.source().is_some());
        assert!(failure.as_error().is_some());
    }

    #[test]
    fn context_display() {
        let ctx = FailureContext::for_task(
            TaskId::from_raw(3),
            Some("poller".to_string()),
            Time::from_millis(20),
        );
        assert_eq!(ctx.to_string(), "T3 (poller) at 20ms");
        assert_eq!(FailureContext::default().to_string(), "<external> at 0ns");
    }
}
