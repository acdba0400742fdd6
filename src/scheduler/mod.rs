//! Tick-driven scheduler: work queue, pump, and stepper entry points.
//!
//! The scheduler owns a thread-safe queue of zero-argument actions and a
//! deadline queue of sleeping bridge steps. The host calls
//! [`Scheduler::pump`] exactly once per logical tick with its current
//! time; everything else — task bodies, stepper resumption, continuation
//! drains — happens inside that call, on the host's execution context.
//!
//! `pump` drains a *snapshot* of the queue: actions enqueued while a pump
//! is running are deferred to the next tick. This is the single
//! anti-recursion guard in the crate — chained continuations and yielded
//! steppers unwind across ticks instead of growing the stack.
//!
//! Construction and queuing are safe from any thread; the pump itself
//! must only ever be invoked by one host loop at a time.

mod timer;

use crate::error::{Error, Result};
use crate::stepper::bridge::StepperBridge;
use crate::stepper::{Step, Stepper};
use crate::task::Task;
use crate::types::Time;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use std::{fmt, mem};
use timer::TimerQueue;
use tracing::trace;

type Action = Box<dyn FnOnce() + Send>;

static DEFAULT_SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

struct SchedulerInner {
    queue: Mutex<Vec<Action>>,
    timers: Mutex<TimerQueue>,
    /// Host time as of the most recent pump, in nanoseconds.
    now: AtomicU64,
}

/// A tick-driven cooperative scheduler.
///
/// Cloning yields another handle to the same scheduler. Independent
/// instances can be constructed for independent host loops; one instance
/// may be installed as the process-wide default for bootstrap
/// convenience.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Creates a new scheduler with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(Vec::new()),
                timers: Mutex::new(TimerQueue::default()),
                now: AtomicU64::new(0),
            }),
        }
    }

    /// Installs this scheduler as the process-wide default.
    ///
    /// The default exists for top-level bootstrap code ([`Task::delay`],
    /// [`StepperExt::run`](crate::stepper::StepperExt::run), tasks
    /// without a bound scheduler); internal logic never reaches for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if a default was already
    /// installed.
    pub fn install_default(&self) -> Result<()> {
        DEFAULT_SCHEDULER
            .set(self.clone())
            .map_err(|_| Error::invalid_state("default scheduler already installed"))
    }

    /// Returns the process-wide default scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no default has been installed.
    pub fn default_instance() -> Result<Self> {
        DEFAULT_SCHEDULER
            .get()
            .cloned()
            .ok_or(Error::invalid_state("no default scheduler installed"))
    }

    /// Returns the host time observed at the most recent pump.
    #[must_use]
    pub fn now(&self) -> Time {
        Time::from_nanos(self.inner.now.load(Ordering::Relaxed))
    }

    /// Appends an action to the work queue. Thread-safe; callable from
    /// any execution context. The action runs on a pump strictly after
    /// this call returns.
    pub fn queue_action<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.queue.lock().push(Box::new(action));
    }

    /// Enqueues the task's execution entry (see [`Task::start_on`] for
    /// the usual path that also performs the status transition).
    pub fn queue_task<T: Send + 'static>(&self, task: &Task<T>) {
        let task = task.clone();
        self.queue_action(move || task.execute());
    }

    /// Registers an action to run on the first pump whose host time is
    /// at or past `deadline`.
    pub(crate) fn queue_at<F>(&self, deadline: Time, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.timers.lock().insert(deadline, Box::new(action));
    }

    /// Drains one tick's work. The host must call this exactly once per
    /// logical tick, with a monotonically non-decreasing `now`.
    ///
    /// Due timer actions and the queue snapshot are both collected
    /// before anything runs: work produced during this pump — including
    /// work produced by timer actions — lands on the next one.
    pub fn pump(&self, now: Time) {
        self.inner.now.store(now.as_nanos(), Ordering::Relaxed);
        let due = self.inner.timers.lock().pop_due(now);
        let queued = mem::take(&mut *self.inner.queue.lock());
        if !due.is_empty() || !queued.is_empty() {
            trace!(
                now = now.as_nanos(),
                due = due.len(),
                queued = queued.len(),
                "pump"
            );
        }
        for action in due {
            action();
        }
        for action in queued {
            action();
        }
    }

    /// Wraps a unit stepper into a task driven by this scheduler.
    ///
    /// The bridge's first step is enqueued here; the returned task has
    /// no runnable body and must not be `start`ed.
    pub fn run<S>(&self, stepper: S) -> Task<()>
    where
        S: Stepper<()> + 'static,
    {
        self.run_with_result(stepper)
    }

    /// Wraps a value-producing stepper into a task driven by this
    /// scheduler.
    ///
    /// The task completes with the value of the stepper's
    /// [`Step::Return`] marker, or with `T::default()` on natural
    /// exhaustion. The bridge's first step is enqueued here; the
    /// returned task has no runnable body and must not be `start`ed.
    pub fn run_with_result<T, S>(&self, stepper: S) -> Task<T>
    where
        T: Default + Send + 'static,
        S: Stepper<T> + 'static,
    {
        let output = Task::pending_bound(self.clone());
        trace!(task = %output.id(), "stepper wrapped");
        let bridge = StepperBridge::new(stepper, output.clone(), self.clone());
        self.queue_action(move || bridge.step());
        output
    }

    /// Returns a task that completes on the first pump at or past
    /// `duration` from the current host time, expressed as a one-marker
    /// sleep stepper.
    pub fn create_delay(&self, duration: Duration) -> Task<()> {
        self.run(std::iter::once(Ok(Step::Sleep(duration))))
    }

    /// Number of actions currently queued for the next pump.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Number of pending timer entries.
    #[must_use]
    pub fn timer_len(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Returns true if no queued actions and no timers are pending.
    ///
    /// Tasks suspended on another task's completion are not counted —
    /// they hold no queue entry until something resolves them.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queued_len() == 0 && self.timer_len() == 0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queued_len())
            .field("timers", &self.timer_len())
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::StepperExt;
    use crate::task::TaskStatus;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn pump_runs_actions_in_insertion_order() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            scheduler.queue_action(move || order.lock().push(n));
        }
        scheduler.pump(Time::ZERO);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn actions_queued_during_a_pump_run_on_the_next_pump() {
        let scheduler = Scheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let requeue = scheduler.clone();
        let counted = hits.clone();
        scheduler.queue_action(move || {
            requeue.queue_action(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            });
        });

        scheduler.pump(Time::ZERO);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.queued_len(), 1);

        scheduler.pump(Time::ZERO);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_stepper_completes_with_default() {
        let scheduler = Scheduler::new();
        let task = scheduler.run_with_result::<i32, _>(std::iter::empty());
        assert_eq!(task.status(), TaskStatus::Created);

        scheduler.pump(Time::ZERO);
        assert_eq!(task.status(), TaskStatus::RanToCompletion);
        assert_eq!(task.result(), Ok(0));
    }

    #[test]
    fn return_marker_completes_with_value_and_drops_the_rest() {
        let scheduler = Scheduler::new();
        let visited_tail = Arc::new(AtomicUsize::new(0));
        let counted = visited_tail.clone();
        let stepper = std::iter::once(Ok(Step::Return(42))).chain(std::iter::once_with(
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(Step::Yield)
            },
        ));

        let task = scheduler.run_with_result::<i32, _>(stepper);
        scheduler.pump(Time::ZERO);
        scheduler.pump(Time::ZERO);

        assert_eq!(task.result(), Ok(42));
        assert_eq!(visited_tail.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn yield_resumes_on_a_later_pump() {
        let scheduler = Scheduler::new();
        let stepper = vec![Ok(Step::Yield), Ok(Step::Return(1))].into_iter();
        let task = scheduler.run_with_result::<i32, _>(stepper);

        scheduler.pump(Time::ZERO);
        assert_eq!(task.status(), TaskStatus::Created);
        scheduler.pump(Time::ZERO);
        assert_eq!(task.result(), Ok(1));
    }

    #[test]
    fn stepper_error_faults_the_output() {
        let scheduler = Scheduler::new();
        let stepper = std::iter::once(Err(Error::fault("boom")));
        let task = scheduler.run_with_result::<i32, _>(stepper);

        scheduler.pump(Time::ZERO);
        assert_eq!(task.status(), TaskStatus::Faulted);
        assert_eq!(task.fault(), Some(Error::fault("boom")));
    }

    #[test]
    fn stepper_panic_faults_the_output() {
        let scheduler = Scheduler::new();
        let stepper = std::iter::once_with(|| -> crate::Result<Step<i32>> {
            panic!("stepper exploded")
        });
        let task = scheduler.run_with_result::<i32, _>(stepper);

        scheduler.pump(Time::ZERO);
        assert_eq!(task.status(), TaskStatus::Faulted);
        assert_eq!(task.fault(), Some(Error::panicked("stepper exploded")));
    }

    #[test]
    fn wait_for_suspends_until_target_completes() {
        let scheduler = Scheduler::new();
        let awaited: Task<i32> = Task::pending();
        let stepper = vec![Ok(Step::wait_for(&awaited)), Ok(Step::Return(7))].into_iter();
        let task = scheduler.run_with_result::<i32, _>(stepper);

        scheduler.pump(Time::ZERO);
        scheduler.pump(Time::ZERO);
        assert_eq!(task.status(), TaskStatus::Created);

        awaited.set_result(0).expect("complete awaited");
        assert_eq!(task.status(), TaskStatus::Created);

        scheduler.pump(Time::ZERO);
        assert_eq!(task.result(), Ok(7));
    }

    #[test]
    fn delay_completes_on_first_pump_at_or_past_deadline() {
        let scheduler = Scheduler::new();
        scheduler.pump(Time::ZERO);
        let delay = scheduler.create_delay(Duration::from_millis(10));

        scheduler.pump(Time::from_millis(1));
        assert_eq!(delay.status(), TaskStatus::Created);
        assert_eq!(scheduler.timer_len(), 1);

        scheduler.pump(Time::from_millis(9));
        assert_eq!(delay.status(), TaskStatus::Created);

        scheduler.pump(Time::from_millis(11));
        assert_eq!(delay.status(), TaskStatus::RanToCompletion);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn default_scheduler_bootstrap() {
        let scheduler = Scheduler::new();
        scheduler.install_default().expect("install");
        assert_eq!(
            scheduler.install_default(),
            Err(Error::invalid_state("default scheduler already installed"))
        );

        let via_default = Scheduler::default_instance().expect("default installed");
        let delay = Task::delay(Duration::from_millis(5)).expect("delay via default");
        let stepped = std::iter::once(Ok(Step::Return(3)))
            .run()
            .expect("run via default");

        via_default.pump(Time::ZERO);
        assert_eq!(stepped.result(), Ok(3));
        assert_eq!(delay.status(), TaskStatus::Created);

        via_default.pump(Time::from_millis(5));
        assert_eq!(delay.status(), TaskStatus::RanToCompletion);
    }
}
