//! Cotick: cooperative tasks and steppers for tick-driven hosts.
//!
//! # Overview
//!
//! Cotick is a task/future abstraction for environments with no native
//! async support — game loops, frame schedulers, embedded main loops.
//! Sequential asynchronous logic is written as a *stepper* (a resumable
//! sequence of [`Step`] markers); a [`Scheduler`] pumped once per host
//! tick drives steppers and task bodies to completion, propagates
//! results and faults, and chains continuations. Nothing ever blocks a
//! thread: waiting is always expressed as continuation registration.
//!
//! # Core Guarantees
//!
//! - **Monotonic lifecycle**: task status only moves forward along
//!   `Created → WaitingToRun → Running → {RanToCompletion | Faulted |
//!   Cancelled}`; result and fault slots are write-once.
//! - **Deterministic continuations**: continuations fire exactly once,
//!   in registration order, never before the terminal status is set.
//! - **Bounded ticks**: work queued during a pump runs on a strictly
//!   later pump, so chained continuations cannot recurse or starve a
//!   tick.
//! - **Cancellation is cooperative**: a one-shot
//!   [`CancellationToken`] broadcast, observed at task entry and at
//!   explicit checkpoints — never preemption.
//! - **Faults are pulled, not thrown**: a failing body or stepper lands
//!   in the task's fault slot; consumers decide whether to inspect or
//!   re-raise via [`Task::result`] / [`Task::check`].
//!
//! # Module Structure
//!
//! - [`cancel`]: one-shot broadcast cancellation token
//! - [`task`]: the task state machine and continuation chaining
//! - [`stepper`]: stepper markers and the bridge driving them
//! - [`scheduler`]: work queue, pump, delays, and the default instance
//! - [`types`]: logical time and task identifiers
//! - [`error`]: error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use cotick::{Scheduler, Step, StepperExt, Task, Time};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//!
//! // A stepper: wait a beat, then produce a value.
//! let greeting = vec![
//!     Ok(Step::Sleep(Duration::from_millis(100))),
//!     Ok(Step::Return("hello")),
//! ]
//! .into_iter()
//! .run_on(&scheduler);
//!
//! // Host loop: pump once per tick with the current time.
//! let mut now = Time::ZERO;
//! while !greeting.is_completed() {
//!     now = now + Duration::from_millis(16);
//!     scheduler.pump(now);
//! }
//! assert_eq!(greeting.result(), Ok("hello"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]

pub mod cancel;
pub mod error;
pub mod scheduler;
pub mod stepper;
pub mod task;
pub mod types;

pub use cancel::CancellationToken;
pub use error::{Error, ErrorKind, Result};
pub use scheduler::Scheduler;
pub use stepper::{Step, Stepper, StepperExt};
pub use task::{
    ContinuationOptions, ContinuationPolicy, Task, TaskOptions, TaskStatus, WaitHandle,
};
pub use types::{TaskId, Time};
