//! Configuration for the lab scheduler.
//!
//! The lab configuration controls deterministic execution:
//! - The virtual instant the clock starts at
//! - Whether spawned work runs eagerly or waits for an explicit run
//! - A runaway guard on the number of polls per run

use crate::types::Time;

/// Configuration for the lab scheduler.
#[derive(Debug, Clone)]
pub struct LabConfig {
    /// Virtual time the clock starts at.
    pub start_time: Time,
    /// Whether the scheduler starts paused.
    ///
    /// A running scheduler executes newly spawned work immediately, up to the
    /// current virtual time. A paused one only queues it.
    pub start_paused: bool,
    /// Maximum number of task polls in a single run before giving up.
    ///
    /// Guards against tasks that keep rescheduling themselves forever.
    pub max_polls_per_run: Option<u64>,
}

impl LabConfig {
    /// Creates the default configuration: time zero, running, bounded runs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start_time: Time::ZERO,
            start_paused: false,
            max_polls_per_run: Some(100_000),
        }
    }

    /// Sets the virtual start time.
    #[must_use]
    pub const fn start_time(mut self, time: Time) -> Self {
        self.start_time = time;
        self
    }

    /// Sets whether the scheduler starts paused.
    #[must_use]
    pub const fn paused(mut self, value: bool) -> Self {
        self.start_paused = value;
        self
    }

    /// Sets the maximum number of polls per run.
    #[must_use]
    pub const fn max_polls_per_run(mut self, polls: u64) -> Self {
        self.max_polls_per_run = Some(polls);
        self
    }

    /// Disables the poll limit.
    #[must_use]
    pub const fn no_poll_limit(mut self) -> Self {
        self.max_polls_per_run = None;
        self
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self::new()
    }
}
