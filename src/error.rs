//! Error types and error handling strategy.
//!
//! The crate distinguishes three failure classes:
//!
//! - **InvalidState**: an operation was attempted against a task or token
//!   in an incompatible lifecycle state (starting a task twice, reading a
//!   result before completion, cancelling twice). Always a
//!   programming-contract violation; surfaced immediately, never retried.
//! - **Cancelled**: cooperative cancellation was observed. Recorded as a
//!   terminal task status and distinguishable from a generic fault.
//! - **Fault / Panicked**: any other condition raised by a task body or a
//!   stepper step. Captured into the task's fault slot and surfaced only
//!   when a caller pulls it via `result`, `check`, or `fault`.
//!
//! There are no automatic retries anywhere in the core; retry policy is
//! the caller's responsibility via explicit re-scheduling.

use std::any::Any;

/// Convenience alias for results carrying the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for task, token, and scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Operation attempted against a task or token in an incompatible
    /// lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// Cooperative cancellation was observed.
    #[error("operation cancelled")]
    Cancelled,
    /// A task body or stepper panicked; the payload is captured as text.
    #[error("panicked: {0}")]
    Panicked(String),
    /// Application-level failure raised by a task body or stepper.
    #[error("{0}")]
    Fault(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lifecycle contract violation.
    InvalidState,
    /// Cooperative cancellation.
    Cancelled,
    /// Isolated panic.
    Panicked,
    /// Application-level fault.
    Fault,
}

impl Error {
    /// Creates a lifecycle-contract error.
    #[must_use]
    pub const fn invalid_state(message: &'static str) -> Self {
        Self::InvalidState(message)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Creates an application-level fault.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// Creates a captured-panic fault.
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked(message.into())
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Panicked(_) => ErrorKind::Panicked,
            Self::Fault(_) => ErrorKind::Fault,
        }
    }

    /// Returns true if this error represents cooperative cancellation.
    ///
    /// Terminal-state classification keys off this: a task whose body
    /// surfaces a cancellation error ends `Cancelled`, not `Faulted`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error's message text, if it carries one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::InvalidState(msg) => Some(msg),
            Self::Cancelled => None,
            Self::Panicked(msg) | Self::Fault(msg) => Some(msg),
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
