//! One-shot broadcast cancellation.
//!
//! A [`CancellationToken`] is a cooperative cancellation signal shared
//! between the code requesting cancellation and the tasks observing it.
//! The flag is write-once: cancellation can be requested exactly once,
//! and callbacks registered after that point run immediately instead of
//! being stored. Cancellation is observed, never imposed — a running task
//! is not preempted; it notices the flag at its next checkpoint.
//!
//! The broadcast takes a snapshot of the registration list under the
//! internal lock and invokes the callbacks with the lock released, so a
//! callback may freely re-enter the token (to register another callback
//! or query the flag) without deadlocking.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TokenState {
    cancelled: bool,
    registrations: SmallVec<[Callback; 2]>,
}

/// A cooperative, one-shot cancellation broadcast primitive.
///
/// Cloning yields another handle to the same underlying token; all
/// clones observe the same flag and registration list.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancellationToken {
    /// Creates a new, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Returns true if cancellation is still possible (false once
    /// cancelled; the flag can never be reset).
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        !self.is_cancellation_requested()
    }

    /// Requests cancellation, invoking every registered callback
    /// synchronously in registration order.
    ///
    /// The callback snapshot is taken under the internal lock;
    /// invocation happens with the lock released. Callbacks registered
    /// concurrently with the broadcast are not part of the snapshot —
    /// they observe the already-set flag and run immediately at their
    /// own registration site instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if cancellation was already
    /// requested.
    pub fn request_cancellation(&self) -> Result<()> {
        let callbacks = {
            let mut state = self.state.lock();
            if state.cancelled {
                return Err(Error::invalid_state("cancellation already requested"));
            }
            state.cancelled = true;
            std::mem::take(&mut state.registrations)
        };
        debug!(callbacks = callbacks.len(), "cancellation requested");
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// Registers a callback to run when cancellation is requested.
    ///
    /// If the token is already cancelled the callback runs immediately,
    /// on the calling context. Either way it runs exactly once.
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let immediate = {
            let mut state = self.state.lock();
            if state.cancelled {
                Some(callback)
            } else {
                state.registrations.push(Box::new(callback));
                None
            }
        };
        if let Some(callback) = immediate {
            callback();
        }
    }

    /// Returns a [`Error::Cancelled`] error if cancellation has been
    /// requested.
    ///
    /// This is the single checkpoint task execution uses before running
    /// a body, and the check stepper bodies are expected to call at
    /// their own cancellation points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the flag is set.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancellation_requested() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CancellationToken")
            .field("cancelled", &state.cancelled)
            .field("registrations", &state.registrations.len())
            .finish()
    }
}
