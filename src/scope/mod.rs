//! Test scopes: one handle binding a scheduler and a failure aggregator.
//!
//! A [`TestScope`] is built from an unordered [`ScopeConfig`]. Resolution
//! picks the single element providing scheduler control (required) and the
//! single element providing failure capture (optional). Teardown runs in a
//! fixed order: finalize the aggregator, then check the scheduler for
//! leftover work.
//!
//! ```
//! use labscope::scope::TestScope;
//! use std::convert::Infallible;
//!
//! let scope = TestScope::with_defaults();
//! scope.spawn(async { Ok::<(), Infallible>(()) });
//! scope.cleanup().expect("clean teardown");
//! ```

mod config;
mod test_scope;

pub use config::{ScopeConfig, ScopeElement};
pub use test_scope::TestScope;

use crate::capture::UncaughtFailureHandler;
use crate::error::PendingWorkError;
use crate::types::{TaskFailure, TaskId, Time};
use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A type-erased task as stored by a scheduler.
pub type BoxedTask = Pin<Box<dyn Future<Output = Result<(), TaskFailure>> + Send + 'static>>;

/// Virtual-time and task control: the capability a scope cannot run without.
pub trait SchedulerControl: Send + Sync + fmt::Debug {
    /// Current virtual time.
    fn now(&self) -> Time;

    /// Advances virtual time by `delta`, running everything that becomes
    /// runnable on the way. Returns how far time actually moved.
    fn advance_time_by(&self, delta: Duration) -> Duration;

    /// Advances virtual time to `target`, running everything that becomes
    /// runnable on the way.
    fn advance_time_to(&self, target: Time);

    /// Advances virtual time until no timers remain. Returns the elapsed
    /// virtual time.
    fn advance_until_idle(&self) -> Duration;

    /// Runs everything runnable at the current virtual time. Returns the
    /// number of task polls.
    fn run_current(&self) -> usize;

    /// Stops newly launched work from running eagerly.
    fn pause(&self);

    /// Resumes eager execution and runs whatever was queued while paused.
    fn resume(&self);

    /// Returns true while paused.
    fn is_paused(&self) -> bool;

    /// Launches a task whose uncaught failure goes to `handler`.
    fn spawn_boxed(
        &self,
        name: Option<String>,
        task: BoxedTask,
        handler: Arc<dyn UncaughtFailureHandler>,
    ) -> TaskId;

    /// Checks that no work is queued or due.
    ///
    /// Tasks suspended on timers in the future are not an error.
    fn cleanup(&self) -> Result<(), PendingWorkError>;
}
