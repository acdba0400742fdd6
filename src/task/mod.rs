//! Task state machine with continuation chaining and cancellation.
//!
//! A [`Task`] is a handle to a unit of deferred work with observable
//! status, result, and fault. Handles have reference semantics: cloning
//! yields another handle to the same shared core, and whichever component
//! holds the last handle (caller, scheduler queue entry, or a
//! continuation closure) owns the core's lifetime.
//!
//! Status moves monotonically along
//! `Created → WaitingToRun → Running → {RanToCompletion | Faulted |
//! Cancelled}`; the three final states are terminal and mutually
//! exclusive. The result and fault slots are write-once. Continuations
//! registered before completion fire exactly once, in registration order,
//! when the terminal status is set; continuations registered afterwards
//! fire immediately at the registration site.
//!
//! Continuation firing is synchronous, uniformly: terminal setters and
//! the execution entry drain the continuation list inline (with the core
//! lock released), and `continue_with` continuation bodies run inline
//! during that drain. Work is deferred to a later tick in exactly one
//! place — the scheduler queue.

use crate::cancel::CancellationToken;
use crate::error::{panic_message, Error, Result};
use crate::scheduler::Scheduler;
use crate::types::TaskId;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type Continuation = Box<dyn FnOnce() + Send>;
type Body<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// The lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Constructed but not yet scheduled.
    Created,
    /// Scheduled; waiting for a pump to reach its execution entry.
    WaitingToRun,
    /// Body is executing on the pump.
    Running,
    /// Terminal: the body (or a result setter) produced a value.
    RanToCompletion,
    /// Terminal: a non-cancellation condition was captured.
    Faulted,
    /// Terminal: cooperative cancellation was observed.
    Cancelled,
}

impl TaskStatus {
    /// Returns true for the three terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RanToCompletion | Self::Faulted | Self::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::WaitingToRun => write!(f, "waiting-to-run"),
            Self::Running => write!(f, "running"),
            Self::RanToCompletion => write!(f, "ran-to-completion"),
            Self::Faulted => write!(f, "faulted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Governs when a continuation runs relative to its parent's terminal
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationPolicy {
    /// Run regardless of how the parent completed.
    #[default]
    Always,
    /// Run only if the parent ran to completion.
    OnlyOnSuccess,
    /// Run only if the parent faulted.
    OnlyOnFault,
}

impl ContinuationPolicy {
    /// Returns true if a parent finishing with `status` admits the
    /// continuation.
    #[must_use]
    pub const fn admits(self, status: TaskStatus) -> bool {
        match self {
            Self::Always => true,
            Self::OnlyOnSuccess => matches!(status, TaskStatus::RanToCompletion),
            Self::OnlyOnFault => matches!(status, TaskStatus::Faulted),
        }
    }
}

/// Construction options for a [`Task`].
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    token: Option<CancellationToken>,
    scheduler: Option<Scheduler>,
}

impl TaskOptions {
    /// Creates empty options (no token, no bound scheduler).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a cancellation token, checked at the top of the execution
    /// entry.
    #[must_use]
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Binds a scheduler, used by [`Task::start`] and inherited by
    /// continuations.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

/// Options for [`Task::continue_with_options`].
#[derive(Debug, Clone, Default)]
pub struct ContinuationOptions {
    policy: ContinuationPolicy,
    token: Option<CancellationToken>,
    scheduler: Option<Scheduler>,
}

impl ContinuationOptions {
    /// Creates default options (`Always` policy, no token, parent's
    /// scheduler).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the continuation policy.
    #[must_use]
    pub fn policy(mut self, policy: ContinuationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Binds a cancellation token to the continuation task.
    #[must_use]
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Binds the continuation task to a scheduler other than the
    /// parent's.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

struct TaskState<T> {
    status: TaskStatus,
    result: Option<T>,
    fault: Option<Error>,
    body: Option<Body<T>>,
    continuations: SmallVec<[Continuation; 2]>,
}

struct TaskCore<T> {
    id: TaskId,
    token: Option<CancellationToken>,
    scheduler: Option<Scheduler>,
    state: Mutex<TaskState<T>>,
}

/// A handle to a unit of deferred work.
///
/// `Task<()>` is the unit variant; `Task<T>` additionally carries a
/// typed result slot readable via [`Task::result`] once the task ran to
/// completion.
pub struct Task<T = ()> {
    core: Arc<TaskCore<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Creates a task from a body closure with default options.
    ///
    /// The task starts in `Created` and does nothing until [`start`]ed
    /// on a scheduler.
    ///
    /// [`start`]: Task::start
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::with_options(body, TaskOptions::default())
    }

    /// Creates a task from a body closure and explicit options.
    pub fn with_options<F>(body: F, options: TaskOptions) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::from_parts(Some(Box::new(body)), options)
    }

    /// Creates a task with no runnable body.
    ///
    /// Completion is driven externally through the terminal setters
    /// ([`set_result`], [`set_completed`], [`set_fault`]) — a one-shot
    /// promise. The stepper bridge uses these as its output tasks.
    /// Calling [`start`] on a pending task is an error.
    ///
    /// [`set_result`]: Task::set_result
    /// [`set_completed`]: Task::set_completed
    /// [`set_fault`]: Task::set_fault
    /// [`start`]: Task::start
    #[must_use]
    pub fn pending() -> Self {
        Self::from_parts(None, TaskOptions::default())
    }

    pub(crate) fn pending_bound(scheduler: Scheduler) -> Self {
        Self::from_parts(None, TaskOptions::default().scheduler(scheduler))
    }

    fn from_parts(body: Option<Body<T>>, options: TaskOptions) -> Self {
        Self {
            core: Arc::new(TaskCore {
                id: TaskId::next(),
                token: options.token,
                scheduler: options.scheduler,
                state: Mutex::new(TaskState {
                    status: TaskStatus::Created,
                    result: None,
                    fault: None,
                    body,
                    continuations: SmallVec::new(),
                }),
            }),
        }
    }

    /// Returns the task's diagnostic identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.core.id
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.core.state.lock().status
    }

    /// Returns true once the task has reached any terminal status.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Returns true if the task ended `Faulted`.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.status() == TaskStatus::Faulted
    }

    /// Returns true if the task ended `Cancelled`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Returns a clone of the captured fault, if any.
    #[must_use]
    pub fn fault(&self) -> Option<Error> {
        self.core.state.lock().fault.clone()
    }

    /// Starts the task on its bound scheduler, falling back to the
    /// process default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is not in `Created`,
    /// has no runnable body, or no scheduler is available.
    pub fn start(&self) -> Result<()> {
        let scheduler = match self.core.scheduler.clone() {
            Some(scheduler) => scheduler,
            None => Scheduler::default_instance()?,
        };
        self.start_on(&scheduler)
    }

    /// Starts the task on the given scheduler: transitions to
    /// `WaitingToRun` and enqueues the execution entry for the next
    /// pump.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is not in `Created`
    /// or has no runnable body.
    pub fn start_on(&self, scheduler: &Scheduler) -> Result<()> {
        {
            let mut state = self.core.state.lock();
            if state.status != TaskStatus::Created {
                return Err(Error::invalid_state("task already started"));
            }
            if state.body.is_none() {
                return Err(Error::invalid_state("task has no runnable body"));
            }
            state.status = TaskStatus::WaitingToRun;
        }
        trace!(task = %self.core.id, "task scheduled");
        scheduler.queue_task(self);
        Ok(())
    }

    /// The execution entry, invoked by the scheduler pump.
    ///
    /// Transitions to `Running`, observes the bound cancellation token,
    /// runs the body with panics isolated, and finishes with the
    /// outcome. Terminal or bodiless tasks are left untouched.
    pub(crate) fn execute(&self) {
        let body = {
            let mut state = self.core.state.lock();
            if state.status.is_terminal() {
                return;
            }
            let Some(body) = state.body.take() else {
                return;
            };
            state.status = TaskStatus::Running;
            body
        };
        trace!(task = %self.core.id, "task running");

        if let Some(token) = &self.core.token {
            if let Err(error) = token.check_cancelled() {
                self.finish(Err(error));
                return;
            }
        }

        let outcome = match catch_unwind(AssertUnwindSafe(body)) {
            Ok(outcome) => outcome,
            Err(payload) => Err(Error::panicked(panic_message(payload.as_ref()))),
        };
        self.finish(outcome);
    }

    fn finish(&self, outcome: Result<T>) {
        if let Err(error) = self.try_finish(outcome) {
            trace!(task = %self.core.id, %error, "task was completed externally");
        }
    }

    /// Moves the task to a terminal status and drains continuations.
    ///
    /// The continuation snapshot is taken (and the list cleared) under
    /// the core lock; invocation happens with the lock released, so a
    /// continuation may re-enter the task freely.
    fn try_finish(&self, outcome: Result<T>) -> Result<()> {
        let (status, continuations) = {
            let mut state = self.core.state.lock();
            if state.status.is_terminal() {
                return Err(Error::invalid_state("task already completed"));
            }
            match outcome {
                Ok(value) => {
                    state.result = Some(value);
                    state.status = TaskStatus::RanToCompletion;
                }
                Err(error) => {
                    state.status = if error.is_cancelled() {
                        TaskStatus::Cancelled
                    } else {
                        TaskStatus::Faulted
                    };
                    state.fault = Some(error);
                }
            }
            (state.status, std::mem::take(&mut state.continuations))
        };
        trace!(
            task = %self.core.id,
            status = %status,
            continuations = continuations.len(),
            "task completed"
        );
        for continuation in continuations {
            continuation();
        }
        Ok(())
    }

    /// Completes the task with a value, draining continuations
    /// synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is already terminal.
    pub fn set_result(&self, value: T) -> Result<()> {
        self.try_finish(Ok(value))
    }

    /// Completes the task with the type's default value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is already terminal.
    pub fn set_completed(&self) -> Result<()>
    where
        T: Default,
    {
        self.try_finish(Ok(T::default()))
    }

    /// Records a condition and moves the task to `Faulted` — or
    /// `Cancelled` when the condition is a cancellation signal — then
    /// drains continuations synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is already terminal.
    pub fn set_fault(&self, error: Error) -> Result<()> {
        self.try_finish(Err(error))
    }

    /// Returns the task's result.
    ///
    /// Never blocks: returns the stored value if `RanToCompletion`, the
    /// captured condition if `Faulted` or `Cancelled`, and an
    /// [`Error::InvalidState`] for any non-terminal status.
    ///
    /// # Errors
    ///
    /// As described above.
    pub fn result(&self) -> Result<T>
    where
        T: Clone,
    {
        let state = self.core.state.lock();
        match state.status {
            TaskStatus::RanToCompletion => state
                .result
                .clone()
                .ok_or(Error::invalid_state("result slot empty")),
            TaskStatus::Faulted | TaskStatus::Cancelled => {
                Err(state.fault.clone().unwrap_or(Error::Cancelled))
            }
            _ => Err(Error::invalid_state("task has not completed")),
        }
    }

    /// Re-raises the captured fault if the task is `Faulted`; no-op
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the captured fault for a `Faulted` task.
    pub fn check(&self) -> Result<()> {
        let state = self.core.state.lock();
        if state.status == TaskStatus::Faulted {
            Err(state
                .fault
                .clone()
                .unwrap_or_else(|| Error::fault("fault slot empty")))
        } else {
            Ok(())
        }
    }

    /// Registers a raw continuation: stored if the task is still
    /// pending, invoked immediately (on the calling context) if the task
    /// is already terminal. Exactly once, either path.
    pub(crate) fn add_continuation(&self, continuation: Continuation) {
        let immediate = {
            let mut state = self.core.state.lock();
            if state.status.is_terminal() {
                Some(continuation)
            } else {
                state.continuations.push(continuation);
                None
            }
        };
        if let Some(continuation) = immediate {
            continuation();
        }
    }

    /// Chains a continuation to run with this task as its argument once
    /// it reaches a terminal status (immediately, if already terminal).
    ///
    /// Returns the continuation's own task, which can itself be awaited,
    /// chained, or cancelled independently. The continuation body runs
    /// inline during the parent's drain, within the same pump that
    /// completed the parent.
    pub fn continue_with<U, F>(&self, callback: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(Task<T>) -> Result<U> + Send + 'static,
    {
        self.continue_with_options(callback, ContinuationOptions::default())
    }

    /// [`continue_with`] with an explicit policy, cancellation token,
    /// and bound scheduler for the continuation task.
    ///
    /// A continuation whose policy does not admit the parent's terminal
    /// status resolves to `Cancelled` instead of running, so chains
    /// never hang on a skipped link.
    ///
    /// [`continue_with`]: Task::continue_with
    pub fn continue_with_options<U, F>(
        &self,
        callback: F,
        options: ContinuationOptions,
    ) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(Task<T>) -> Result<U> + Send + 'static,
    {
        let parent = self.clone();
        let task_options = TaskOptions {
            token: options.token,
            scheduler: options
                .scheduler
                .or_else(|| self.core.scheduler.clone()),
        };
        let continuation: Task<U> =
            Task::with_options(move || callback(parent), task_options);

        let policy = options.policy;
        let observed = self.clone();
        let fired = continuation.clone();
        self.add_continuation(Box::new(move || {
            if policy.admits(observed.status()) {
                fired.execute();
            } else {
                fired.abandon();
            }
        }));
        continuation
    }

    /// Resolves a skipped continuation to `Cancelled`.
    fn abandon(&self) {
        self.finish(Err(Error::cancelled()));
    }

    /// Returns a type-erased handle suitable for a stepper's
    /// [`Step::WaitFor`](crate::stepper::Step::WaitFor) marker.
    #[must_use]
    pub fn wait_handle(&self) -> WaitHandle {
        WaitHandle {
            target: Arc::new(self.clone()),
        }
    }
}

impl Task<()> {
    /// Creates a delay task on the process-default scheduler.
    ///
    /// Bootstrap sugar over
    /// [`Scheduler::create_delay`](crate::scheduler::Scheduler::create_delay).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no default scheduler is
    /// installed.
    pub fn delay(duration: Duration) -> Result<Self> {
        Ok(Scheduler::default_instance()?.create_delay(duration))
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("Task")
            .field("id", &self.core.id)
            .field("status", &state.status)
            .field("continuations", &state.continuations.len())
            .finish()
    }
}

trait AwaitTarget: Send + Sync {
    fn task_id(&self) -> TaskId;
    fn on_terminal(&self, continuation: Continuation);
}

impl<T: Send + 'static> AwaitTarget for Task<T> {
    fn task_id(&self) -> TaskId {
        self.id()
    }

    fn on_terminal(&self, continuation: Continuation) {
        self.add_continuation(continuation);
    }
}

/// A type-erased reference to a task another stepper can wait on.
///
/// Carries no ownership of the task's result — only the completion
/// relationship. Obtained via [`Task::wait_handle`].
#[derive(Clone)]
pub struct WaitHandle {
    target: Arc<dyn AwaitTarget>,
}

impl WaitHandle {
    /// Returns the referenced task's diagnostic identifier.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.target.task_id()
    }

    pub(crate) fn on_terminal(&self, continuation: Continuation) {
        self.target.on_terminal(continuation);
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitHandle").field(&self.task_id()).finish()
    }
}
