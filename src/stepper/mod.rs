//! Stepper authoring surface.
//!
//! A *stepper* is paused asynchronous logic expressed as a resumable
//! sequence: any `Iterator` yielding `Result<Step<T>, Error>` items. The
//! scheduler's bridge advances the stepper one item per entry and maps
//! each yielded [`Step`] marker onto task state transitions:
//!
//! - [`Step::WaitFor`] suspends until the referenced task completes,
//! - [`Step::Return`] produces the stepper's final value early,
//! - [`Step::Sleep`] suspends for a host-time duration,
//! - [`Step::Yield`] hands control back to the host until a later tick,
//! - an `Err` item (or a panic inside `next`) faults the wrapping task,
//! - iterator exhaustion completes the wrapping task with the default
//!   value.
//!
//! Steppers are written with ordinary iterator machinery —
//! `std::iter::from_fn` over a state machine, chained `once`/`empty`
//! combinators, or a hand-rolled `Iterator` impl.

pub(crate) mod bridge;

use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::task::{Task, WaitHandle};
use std::fmt;
use std::time::Duration;

/// A value yielded by a stepper, matched exhaustively by the bridge.
pub enum Step<T> {
    /// Suspend until the referenced task reaches a terminal status.
    WaitFor(WaitHandle),
    /// Produce the stepper's final value; the rest of the sequence is
    /// dropped unvisited.
    Return(T),
    /// Give control back to the host; resume on a later tick.
    Yield,
    /// Suspend until the given host-time duration has elapsed.
    Sleep(Duration),
}

impl<T> Step<T> {
    /// Convenience constructor for [`Step::WaitFor`].
    #[must_use]
    pub fn wait_for<U: Send + 'static>(task: &Task<U>) -> Self {
        Self::WaitFor(task.wait_handle())
    }
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitFor(handle) => f.debug_tuple("WaitFor").field(handle).finish(),
            Self::Return(_) => write!(f, "Return(..)"),
            Self::Yield => write!(f, "Yield"),
            Self::Sleep(duration) => f.debug_tuple("Sleep").field(duration).finish(),
        }
    }
}

/// The stepper contract: a sendable iterator of step results.
///
/// Blanket-implemented; never implement it by hand.
pub trait Stepper<T>: Iterator<Item = Result<Step<T>>> + Send {}

impl<T, I> Stepper<T> for I where I: Iterator<Item = Result<Step<T>>> + Send {}

/// Run sugar for steppers.
pub trait StepperExt<T>: Stepper<T> + Sized + 'static
where
    T: Default + Send + 'static,
{
    /// Wraps this stepper into a task driven by `scheduler`.
    ///
    /// Equivalent to
    /// [`Scheduler::run_with_result`](crate::scheduler::Scheduler::run_with_result).
    fn run_on(self, scheduler: &Scheduler) -> Task<T> {
        scheduler.run_with_result(self)
    }

    /// Wraps this stepper into a task driven by the process-default
    /// scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) if no
    /// default scheduler is installed.
    fn run(self) -> Result<Task<T>> {
        Ok(Scheduler::default_instance()?.run_with_result(self))
    }
}

impl<T, I> StepperExt<T> for I
where
    T: Default + Send + 'static,
    I: Stepper<T> + Sized + 'static,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_names_the_marker() {
        assert_eq!(format!("{:?}", Step::<i32>::Yield), "Yield");
        assert_eq!(format!("{:?}", Step::<i32>::Return(5)), "Return(..)");
        let sleep = Step::<i32>::Sleep(Duration::from_millis(3));
        assert!(format!("{sleep:?}").starts_with("Sleep"));

        let task: Task<u8> = Task::pending();
        let wait = Step::<i32>::wait_for(&task);
        let rendered = format!("{wait:?}");
        assert!(rendered.starts_with("WaitFor"));
        assert!(rendered.contains(&task.id().as_u64().to_string()));
    }
}
