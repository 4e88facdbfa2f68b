//! Core types: identifiers, virtual time, and task failures.

pub mod failure;
pub mod id;

pub use failure::{CapturedFailure, FailureContext, TaskFailure};
pub use id::{TaskId, Time};
pub(crate) use id::duration_to_nanos_saturating;
