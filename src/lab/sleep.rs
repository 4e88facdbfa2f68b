//! Virtual-time sleep.

use super::scheduler::LabHandle;
use crate::types::Time;
use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Future returned by [`LabScheduler::sleep`] and
/// [`LabScheduler::sleep_until`].
///
/// Completes once the scheduler's virtual clock reaches the deadline. A task
/// suspended here does not count as unfinished work at teardown. The sleep
/// does not keep its scheduler alive; once the scheduler is dropped it never
/// completes.
///
/// [`LabScheduler::sleep`]: super::LabScheduler::sleep
/// [`LabScheduler::sleep_until`]: super::LabScheduler::sleep_until
pub struct Sleep {
    scheduler: LabHandle,
    deadline: Time,
    /// Waker the pending timer was registered with.
    registered: Option<Waker>,
}

impl Sleep {
    pub(crate) fn new(scheduler: LabHandle, deadline: Time) -> Self {
        Self {
            scheduler,
            deadline,
            registered: None,
        }
    }

    /// The virtual instant this sleep completes at.
    #[must_use]
    pub fn deadline(&self) -> Time {
        self.deadline
    }

    /// Returns true if the deadline has been reached.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|lab| lab.now() >= self.deadline)
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(lab) = this.scheduler.upgrade() else {
            return Poll::Pending;
        };
        if lab.now() >= this.deadline {
            return Poll::Ready(());
        }
        let registered = this
            .registered
            .as_ref()
            .is_some_and(|waker| waker.will_wake(cx.waker()));
        if !registered {
            lab.register_timer(this.deadline, cx.waker().clone());
            this.registered = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.registered.is_some())
            .finish_non_exhaustive()
    }
}
