//! Virtual time.

mod clock;

pub use clock::{TimeSource, VirtualClock};
