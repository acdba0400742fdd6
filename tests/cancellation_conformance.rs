//! Cancellation conformance: token broadcast semantics and cooperative
//! task cancellation.

mod common;

use common::TickHost;
use cotick::{
    CancellationToken, Error, Step, Task, TaskOptions, TaskStatus,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn second_cancellation_request_is_rejected() {
    let token = CancellationToken::new();
    assert!(token.can_be_cancelled());

    token.request_cancellation().expect("first request");
    assert!(token.is_cancellation_requested());
    assert!(!token.can_be_cancelled());
    assert!(matches!(
        token.request_cancellation(),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn callbacks_registered_after_cancellation_run_once_immediately() {
    let token = CancellationToken::new();
    token.request_cancellation().expect("cancel");

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    token.register(move || {
        counted.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn broadcast_runs_callbacks_in_registration_order() {
    let token = CancellationToken::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for n in 0..6 {
        let order = order.clone();
        token.register(move || order.lock().push(n));
    }
    token.request_cancellation().expect("cancel");
    assert_eq!(*order.lock(), (0..6).collect::<Vec<_>>());
}

#[test]
fn token_cancelled_before_execution_aborts_the_task() {
    let mut host = TickHost::new();
    let token = CancellationToken::new();
    let body_ran = Arc::new(AtomicUsize::new(0));

    let counted = body_ran.clone();
    let task: Task<i32> = Task::with_options(
        move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        },
        TaskOptions::new().token(token.clone()),
    );
    task.start_on(&host.scheduler).expect("start");
    token.request_cancellation().expect("cancel");

    host.tick();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(task.is_cancelled());
    assert!(!task.is_faulted());
    assert_eq!(body_ran.load(Ordering::SeqCst), 0);
    assert_eq!(task.result(), Err(Error::Cancelled));
    // check() only re-raises faults, not cancellation.
    assert!(task.check().is_ok());
}

#[test]
fn running_task_observes_the_token_at_its_own_checkpoint() {
    let mut host = TickHost::new();
    let token = CancellationToken::new();

    // A stepper that checks the token each tick.
    let checked = token.clone();
    let stepper = std::iter::from_fn(move || {
        if let Err(error) = checked.check_cancelled() {
            return Some(Err(error));
        }
        Some(Ok(Step::Yield))
    });
    let task = host.scheduler.run(stepper);

    host.tick_many(3);
    assert_eq!(task.status(), TaskStatus::Created);

    token.request_cancellation().expect("cancel");
    host.tick();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert_eq!(task.fault(), Some(Error::Cancelled));
}

#[test]
fn registration_can_resolve_a_pending_task() {
    let token = CancellationToken::new();
    let pending: Task<i32> = Task::pending();

    let resolved = pending.clone();
    token.register(move || {
        let _ = resolved.set_fault(Error::cancelled());
    });

    token.request_cancellation().expect("cancel");
    assert_eq!(pending.status(), TaskStatus::Cancelled);
}

#[test]
fn continuation_token_gates_the_continuation_not_the_parent() {
    let mut host = TickHost::new();
    let token = CancellationToken::new();
    let parent = Task::new(|| Ok(1));
    let gated = parent.continue_with_options(
        |_| Ok(()),
        cotick::ContinuationOptions::new().token(token.clone()),
    );

    token.request_cancellation().expect("cancel");
    parent.start_on(&host.scheduler).expect("start");
    host.tick();

    assert_eq!(parent.status(), TaskStatus::RanToCompletion);
    assert_eq!(gated.status(), TaskStatus::Cancelled);
}

#[test]
fn callback_reentering_the_token_does_not_deadlock() {
    let token = CancellationToken::new();
    let late = Arc::new(AtomicUsize::new(0));

    let reentrant = token.clone();
    let counted = late.clone();
    token.register(move || {
        assert!(reentrant.is_cancellation_requested());
        let counted = counted.clone();
        reentrant.register(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
    });

    token.request_cancellation().expect("cancel");
    assert_eq!(late.load(Ordering::SeqCst), 1);
}
