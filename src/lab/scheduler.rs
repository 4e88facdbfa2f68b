//! The lab scheduler: a single-lock, virtual-time task executor.
//!
//! Tasks run on whichever thread drives the scheduler (a spawn in eager mode,
//! `run_current`, or one of the `advance_*` calls). The ready queue is FIFO and
//! timers fire in `(deadline, registration)` order, so a test observes the
//! same interleaving on every run.
//!
//! The state lock is never held while a task is polled or while a waker or
//! failure handler is invoked.

use super::config::LabConfig;
use super::sleep::Sleep;
use crate::capture::{LoggingFailureHandler, UncaughtFailureHandler};
use crate::dispatch::{Dispatch, Job};
use crate::error::PendingWorkError;
use crate::scope::{BoxedTask, SchedulerControl};
use crate::time::{TimeSource, VirtualClock};
use crate::types::{FailureContext, TaskFailure, TaskId, Time};
use core::fmt;
use parking_lot::Mutex;
use slab::Slab;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::convert::Infallible;
use std::error::Error;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

/// Slab key plus the id the slot held when the reference was taken.
type TaskRef = (usize, TaskId);

struct TaskSlot {
    id: TaskId,
    name: Option<String>,
    /// `None` while the task is being polled.
    future: Option<BoxedTask>,
    /// One waker per task, so repeated polls present the same waker.
    waker: Waker,
    handler: Arc<dyn UncaughtFailureHandler>,
    queued: bool,
}

struct TimerEntry {
    deadline: Time,
    seq: u64,
    owner: Option<TaskRef>,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

struct State {
    tasks: Slab<TaskSlot>,
    ready: VecDeque<TaskRef>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    next_task: u64,
    next_timer_seq: u64,
    paused: bool,
    running: bool,
    /// Task currently being polled, so timers can be attributed to it.
    current: Option<TaskRef>,
}

impl State {
    fn is_live(&self, (key, id): TaskRef) -> bool {
        self.tasks.get(key).is_some_and(|slot| slot.id == id)
    }

    fn enqueue(&mut self, (key, id): TaskRef) {
        if let Some(slot) = self.tasks.get_mut(key) {
            if slot.id == id && !slot.queued {
                slot.queued = true;
                self.ready.push_back((key, id));
            }
        }
    }

    fn queued_count(&self) -> usize {
        self.ready.iter().filter(|r| self.is_live(**r)).count()
    }

    fn timer_is_live(&self, entry: &TimerEntry) -> bool {
        entry.owner.is_none_or(|owner| self.is_live(owner))
    }
}

struct Inner {
    clock: VirtualClock,
    config: LabConfig,
    default_handler: Arc<dyn UncaughtFailureHandler>,
    state: Mutex<State>,
}

struct TaskWaker {
    task: TaskRef,
    inner: Weak<Inner>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state.lock().enqueue(self.task);
        }
    }
}

/// Clears the running flag when a run stops early or unwinds.
///
/// A run that drains the ready queue clears the flag itself, under the same
/// lock that saw the queue empty, and disarms the guard.
struct RunGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state.lock();
            state.running = false;
            state.current = None;
        }
    }
}

enum Next {
    Task(TaskRef, BoxedTask, Waker),
    TimersDue,
    Idle,
}

/// Non-owning handle for futures that live inside the scheduler's own tasks.
#[derive(Clone)]
pub(crate) struct LabHandle(Weak<Inner>);

impl LabHandle {
    pub(crate) fn upgrade(&self) -> Option<LabScheduler> {
        self.0.upgrade().map(|inner| LabScheduler { inner })
    }
}

/// A deterministic scheduler driven by virtual time.
///
/// Cloning is cheap; clones share the same clock and task set.
///
/// # Example
///
/// ```
/// use labscope::lab::{LabConfig, LabScheduler};
/// use labscope::scope::SchedulerControl;
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// let scheduler = LabScheduler::new(LabConfig::default());
/// let sleeper = scheduler.clone();
/// scheduler.spawn(async move {
///     sleeper.sleep(Duration::from_secs(5)).await;
///     Ok::<(), Infallible>(())
/// });
///
/// assert_eq!(scheduler.live_task_count(), 1);
/// scheduler.advance_time_by(Duration::from_secs(5));
/// assert_eq!(scheduler.live_task_count(), 0);
/// ```
#[derive(Clone)]
pub struct LabScheduler {
    inner: Arc<Inner>,
}

impl LabScheduler {
    /// Creates a scheduler that logs uncaught failures of directly spawned
    /// tasks.
    #[must_use]
    pub fn new(config: LabConfig) -> Self {
        Self::with_failure_handler(config, Arc::new(LoggingFailureHandler))
    }

    /// Creates a scheduler that routes uncaught failures of directly spawned
    /// tasks to `handler`.
    #[must_use]
    pub fn with_failure_handler(
        config: LabConfig,
        handler: Arc<dyn UncaughtFailureHandler>,
    ) -> Self {
        let state = State {
            tasks: Slab::new(),
            ready: VecDeque::new(),
            timers: BinaryHeap::new(),
            next_task: 0,
            next_timer_seq: 0,
            paused: config.start_paused,
            running: false,
            current: None,
        };
        Self {
            inner: Arc::new(Inner {
                clock: VirtualClock::starting_at(config.start_time),
                config,
                default_handler: handler,
                state: Mutex::new(state),
            }),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.clock.now()
    }

    /// Spawns a task whose failures go to the scheduler's handler.
    pub fn spawn<F, E>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.spawn_boxed(
            None,
            box_task(future),
            Arc::clone(&self.inner.default_handler),
        )
    }

    /// Spawns a named task whose failures go to the scheduler's handler.
    pub fn spawn_named<F, E>(&self, name: impl Into<String>, future: F) -> TaskId
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.spawn_boxed(
            Some(name.into()),
            box_task(future),
            Arc::clone(&self.inner.default_handler),
        )
    }

    /// Returns a future that completes once virtual time has advanced by
    /// `duration`.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.handle(), self.now() + duration)
    }

    /// Returns a future that completes once virtual time reaches `deadline`.
    #[must_use]
    pub fn sleep_until(&self, deadline: Time) -> Sleep {
        Sleep::new(self.handle(), deadline)
    }

    /// Number of tasks waiting in the ready queue.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queued_count()
    }

    /// Number of registered timers whose task is still alive.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .timers
            .iter()
            .filter(|Reverse(entry)| state.timer_is_live(entry))
            .count()
    }

    /// Number of tasks that have not completed.
    #[must_use]
    pub fn live_task_count(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Returns true when nothing is queued and no timer is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queued_count() == 0 && self.timer_count() == 0
    }

    pub(crate) fn handle(&self) -> LabHandle {
        LabHandle(Arc::downgrade(&self.inner))
    }

    /// Registers `waker` to be woken once virtual time reaches `deadline`.
    pub(crate) fn register_timer(&self, deadline: Time, waker: Waker) {
        let mut state = self.inner.state.lock();
        let seq = state.next_timer_seq;
        state.next_timer_seq += 1;
        let owner = state.current;
        state.timers.push(Reverse(TimerEntry {
            deadline,
            seq,
            owner,
            waker,
        }));
    }

    fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    fn next_deadline(&self) -> Option<Time> {
        let mut state = self.inner.state.lock();
        loop {
            let entry = state.timers.peek()?;
            if state.timer_is_live(&entry.0) {
                return Some(entry.0.deadline);
            }
            state.timers.pop();
        }
    }

    fn fire_due_timers(&self) -> usize {
        let now = self.now();
        let wakers: Vec<Waker> = {
            let mut state = self.inner.state.lock();
            let mut due = Vec::new();
            while state
                .timers
                .peek()
                .is_some_and(|Reverse(entry)| entry.deadline <= now)
            {
                if let Some(Reverse(entry)) = state.timers.pop() {
                    if state.timer_is_live(&entry) {
                        due.push(entry.waker);
                    }
                }
            }
            due
        };
        let fired = wakers.len();
        for waker in wakers {
            waker.wake();
        }
        fired
    }

    /// Pops the next runnable task. When nothing is runnable or due, ends the
    /// run in the same critical section, so concurrent work either lands
    /// before the check or finds the scheduler idle and runs itself.
    fn take_next(&self) -> Next {
        let mut state = self.inner.state.lock();
        while let Some((key, id)) = state.ready.pop_front() {
            let Some(slot) = state.tasks.get_mut(key) else {
                continue;
            };
            if slot.id != id {
                continue;
            }
            slot.queued = false;
            if let Some(future) = slot.future.take() {
                let waker = slot.waker.clone();
                state.current = Some((key, id));
                return Next::Task((key, id), future, waker);
            }
        }
        let now = self.inner.clock.now();
        if state
            .timers
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            return Next::TimersDue;
        }
        state.running = false;
        state.current = None;
        Next::Idle
    }

    fn poll_task(&self, task: TaskRef, mut future: BoxedTask, waker: &Waker) {
        let (key, id) = task;
        let mut cx = Context::from_waker(waker);
        let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

        let outcome = match polled {
            Ok(Poll::Pending) => {
                let mut state = self.inner.state.lock();
                state.current = None;
                if let Some(slot) = state.tasks.get_mut(key) {
                    if slot.id == id {
                        slot.future = Some(future);
                    }
                }
                return;
            }
            Ok(Poll::Ready(Ok(()))) => None,
            Ok(Poll::Ready(Err(failure))) => Some(failure),
            Err(payload) => Some(TaskFailure::from_panic_payload(payload.as_ref())),
        };

        let slot = {
            let mut state = self.inner.state.lock();
            state.current = None;
            match state.tasks.get(key) {
                Some(slot) if slot.id == id => state.tasks.try_remove(key),
                _ => None,
            }
        };
        let Some(slot) = slot else {
            return;
        };
        match outcome {
            None => {
                tracing::trace!(task = %id, "lab task completed");
            }
            Some(failure) => {
                let context = FailureContext::for_task(id, slot.name, self.now());
                tracing::trace!(task = %id, failure = %failure, "lab task failed");
                slot.handler.handle_failure(context, failure);
            }
        }
    }

    fn poll_limit_reached(&self, polls: u64) -> bool {
        match self.inner.config.max_polls_per_run {
            Some(max) if polls >= max => {
                tracing::warn!(
                    polls,
                    now = %self.now(),
                    "lab scheduler poll limit reached, stopping run"
                );
                true
            }
            _ => false,
        }
    }

    /// Runs work that is runnable at the current time, starting from an
    /// already-consumed poll count. Returns the new count.
    fn run_current_from(&self, mut polls: u64) -> u64 {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                return polls;
            }
            state.running = true;
        }
        let mut guard = RunGuard {
            inner: &self.inner,
            armed: true,
        };
        loop {
            self.fire_due_timers();
            let (task, future, waker) = match self.take_next() {
                Next::Task(task, future, waker) => (task, future, waker),
                Next::TimersDue => continue,
                Next::Idle => {
                    guard.armed = false;
                    break;
                }
            };
            self.poll_task(task, future, &waker);
            polls += 1;
            if self.poll_limit_reached(polls) {
                break;
            }
        }
        polls
    }

    /// Moves time forward, firing every timer up to `target` in order.
    fn advance_to_inner(&self, target: Time) {
        if self.is_running() {
            // A run is active, from a task or another thread. It fires the
            // timers before it ends; if it ended in between, run here.
            self.inner.clock.advance_to(target);
            self.run_current_from(0);
            return;
        }
        let mut polls = self.run_current_from(0);
        while let Some(deadline) = self.next_deadline() {
            if deadline > target || self.poll_limit_reached(polls) {
                break;
            }
            self.inner.clock.advance_to(deadline);
            polls = self.run_current_from(polls);
        }
        self.inner.clock.advance_to(target);
        self.run_current_from(polls);
    }
}

fn box_task<F, E>(future: F) -> BoxedTask
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Error + Send + Sync + 'static,
{
    Box::pin(async move { future.await.map_err(TaskFailure::error) })
}

impl SchedulerControl for LabScheduler {
    fn now(&self) -> Time {
        self.inner.clock.now()
    }

    fn advance_time_by(&self, delta: Duration) -> Duration {
        let start = self.now();
        self.advance_to_inner(start + delta);
        self.now().duration_since(start)
    }

    fn advance_time_to(&self, target: Time) {
        self.advance_to_inner(target);
    }

    fn advance_until_idle(&self) -> Duration {
        let start = self.now();
        if self.is_running() {
            return Duration::ZERO;
        }
        let mut polls = self.run_current_from(0);
        while let Some(deadline) = self.next_deadline() {
            if self.poll_limit_reached(polls) {
                break;
            }
            self.inner.clock.advance_to(deadline);
            polls = self.run_current_from(polls);
        }
        self.now().duration_since(start)
    }

    fn run_current(&self) -> usize {
        self.run_current_from(0) as usize
    }

    fn pause(&self) {
        self.inner.state.lock().paused = true;
    }

    fn resume(&self) {
        self.inner.state.lock().paused = false;
        self.run_current_from(0);
    }

    fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    fn spawn_boxed(
        &self,
        name: Option<String>,
        task: BoxedTask,
        handler: Arc<dyn UncaughtFailureHandler>,
    ) -> TaskId {
        let (id, eager) = {
            let mut state = self.inner.state.lock();
            state.next_task += 1;
            let id = TaskId::from_raw(state.next_task);
            let entry = state.tasks.vacant_entry();
            let key = entry.key();
            let waker = Waker::from(Arc::new(TaskWaker {
                task: (key, id),
                inner: Arc::downgrade(&self.inner),
            }));
            entry.insert(TaskSlot {
                id,
                name,
                future: Some(task),
                waker,
                handler,
                queued: false,
            });
            state.enqueue((key, id));
            (id, !state.paused)
        };
        tracing::trace!(task = %id, now = %self.now(), eager, "lab task spawned");
        if eager {
            self.run_current_from(0);
        }
        id
    }

    fn cleanup(&self) -> Result<(), PendingWorkError> {
        let now = self.now();
        let state = self.inner.state.lock();
        let queued = state.queued_count();
        let due_timers = state
            .timers
            .iter()
            .filter(|Reverse(entry)| entry.deadline <= now && state.timer_is_live(entry))
            .count();
        if queued == 0 && due_timers == 0 {
            tracing::debug!(
                now = %now,
                suspended = state.tasks.len(),
                "lab scheduler quiescent at teardown"
            );
            return Ok(());
        }
        tracing::debug!(
            now = %now,
            queued,
            due_timers,
            "lab scheduler has unfinished work at teardown"
        );
        Err(PendingWorkError {
            now,
            queued,
            due_timers,
        })
    }
}

impl Dispatch for LabScheduler {
    fn dispatch(&self, job: Job) {
        self.spawn_named("dispatched", async move {
            job();
            Ok::<(), Infallible>(())
        });
    }

    fn name(&self) -> &str {
        "lab"
    }
}

impl Default for LabScheduler {
    fn default() -> Self {
        Self::new(LabConfig::default())
    }
}

impl fmt::Debug for LabScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LabScheduler")
            .field("now", &self.inner.clock.now())
            .field("tasks", &state.tasks.len())
            .field("queued", &state.queued_count())
            .field("timers", &state.timers.len())
            .field("paused", &state.paused)
            .finish()
    }
}
