//! Deterministic lab scheduler for testing.
//!
//! The lab scheduler provides:
//!
//! - Virtual time (no wall-clock dependencies)
//! - Deterministic FIFO scheduling with timers ordered by deadline
//! - Panic and error capture for every task, routed to a failure handler
//! - A teardown check that rejects queued work but tolerates tasks
//!   suspended on timers that were never reached
//!
//! # Quick Start
//!
//! ```
//! use labscope::lab::{LabConfig, LabScheduler};
//! use labscope::scope::SchedulerControl;
//! use std::convert::Infallible;
//! use std::time::Duration;
//!
//! let lab = LabScheduler::new(LabConfig::default());
//! let clock = lab.clone();
//! lab.spawn(async move {
//!     clock.sleep(Duration::from_millis(250)).await;
//!     Ok::<(), Infallible>(())
//! });
//!
//! lab.advance_until_idle();
//! assert!(lab.cleanup().is_ok());
//! ```

pub mod config;
mod scheduler;
mod sleep;

pub use config::LabConfig;
pub use scheduler::LabScheduler;
pub use sleep::Sleep;
