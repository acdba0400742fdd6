//! The stepper bridge: drives a stepper to completion against its
//! output task.
//!
//! One bridge entry performs exactly one stepper advancement, then either
//! finishes the output task or suspends by handing its own next entry to
//! the scheduler (queue or timer) or to the awaited task's continuation
//! list. Suspension always re-enters through the scheduler queue, so a
//! chain of immediately-available waits unwinds across pumps instead of
//! recursing the execution context, and each suspension point is resumed
//! exactly once.

use super::{Step, Stepper};
use crate::error::{panic_message, Error};
use crate::scheduler::Scheduler;
use crate::task::Task;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, trace};

pub(crate) struct StepperBridge<T, S> {
    stepper: S,
    output: Task<T>,
    scheduler: Scheduler,
}

impl<T, S> StepperBridge<T, S>
where
    T: Default + Send + 'static,
    S: Stepper<T> + 'static,
{
    pub(crate) fn new(stepper: S, output: Task<T>, scheduler: Scheduler) -> Box<Self> {
        Box::new(Self {
            stepper,
            output,
            scheduler,
        })
    }

    /// Advances the stepper one step and acts on what it yielded.
    pub(crate) fn step(mut self: Box<Self>) {
        let advanced = catch_unwind(AssertUnwindSafe(|| self.stepper.next()));
        let item = match advanced {
            Ok(item) => item,
            Err(payload) => {
                let error = Error::panicked(panic_message(payload.as_ref()));
                debug!(task = %self.output.id(), %error, "stepper panicked");
                self.finish_with_fault(error);
                return;
            }
        };

        match item {
            None => {
                if let Err(error) = self.output.set_completed() {
                    trace!(task = %self.output.id(), %error, "output already completed");
                }
            }
            Some(Err(error)) => {
                debug!(task = %self.output.id(), %error, "stepper raised");
                self.finish_with_fault(error);
            }
            Some(Ok(Step::Return(value))) => {
                if let Err(error) = self.output.set_result(value) {
                    trace!(task = %self.output.id(), %error, "output already completed");
                }
            }
            Some(Ok(Step::WaitFor(handle))) => {
                trace!(
                    task = %self.output.id(),
                    awaited = %handle.task_id(),
                    "stepper waiting on task"
                );
                let scheduler = self.scheduler.clone();
                handle.on_terminal(Box::new(move || {
                    scheduler.queue_action(move || self.step());
                }));
            }
            Some(Ok(Step::Sleep(duration))) => {
                let deadline = self.scheduler.now() + duration;
                trace!(task = %self.output.id(), ?deadline, "stepper sleeping");
                let scheduler = self.scheduler.clone();
                scheduler.queue_at(deadline, move || self.step());
            }
            Some(Ok(Step::Yield)) => {
                let scheduler = self.scheduler.clone();
                scheduler.queue_action(move || self.step());
            }
        }
    }

    fn finish_with_fault(self, error: Error) {
        if let Err(error) = self.output.set_fault(error) {
            trace!(task = %self.output.id(), %error, "output already completed");
        }
    }
}
