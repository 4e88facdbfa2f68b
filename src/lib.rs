//! Labscope: deterministic test scopes for concurrent task code.
//!
//! # Overview
//!
//! Labscope lets a test run asynchronous tasks against a virtual clock,
//! capture every failure those tasks raise without tearing down the test
//! process, and verify at teardown that no work was silently lost or left
//! unfinished.
//!
//! # Core Guarantees
//!
//! - **No lost failures**: every uncaught task failure is recorded, or, once
//!   the capture window closed, handed to a fallback handler
//! - **One verdict**: teardown raises the first failure, otherwise reports
//!   leftover work, otherwise succeeds
//! - **Deterministic time**: virtual time only moves when the test moves it
//! - **Explicit process state**: the default dispatcher override is a single
//!   documented slot with set/reset operations
//!
//! # Module Structure
//!
//! - [`types`]: Core types (task ids, virtual time, task failures)
//! - [`time`]: Virtual clock
//! - [`capture`]: Failure handlers and the failure collector
//! - [`scope`]: Test scopes and their configuration
//! - [`lab`]: Deterministic lab scheduler with virtual time
//! - [`dispatch`]: Process-wide default dispatcher override
//! - [`error`](mod@error): Error types
//!
//! # Example
//!
//! ```
//! use labscope::scope::TestScope;
//!
//! let scope = TestScope::with_defaults();
//! scope.spawn(async { Err::<(), _>(std::fmt::Error) });
//!
//! let err = scope.cleanup().unwrap_err();
//! assert!(err.as_failure().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod dispatch;
pub mod error;
pub mod lab;
pub mod scope;
pub mod time;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use capture::{FailureCapture, FailureCollector, UncaughtFailureHandler};
pub use error::{
    AggregatedTestFailure, Capability, CleanupError, ConfigurationError, PendingWorkError,
};
pub use lab::{LabConfig, LabScheduler};
pub use scope::{ScopeConfig, ScopeElement, SchedulerControl, TestScope};
pub use types::{CapturedFailure, FailureContext, TaskFailure, TaskId, Time};
