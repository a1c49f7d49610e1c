use std::time::Duration;

use crate::breakpoint::BreakpointId;
use crate::session::ExecutionState;

/// Target session error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct SessionError<E>(pub E);

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    /// The target session reported an error.
    #[error(transparent)]
    Session(#[from] SessionError<E>),

    /// Suspend/resume bookkeeping went out of sync with the target.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// A symbol needed for an evaluation couldn't be resolved.
    #[error(transparent)]
    SymbolResolution(#[from] SymbolError),

    /// An invoke didn't complete in time.
    #[error("invoke did not complete within {0:?}")]
    InvokeTimeout(Duration),

    /// The target dropped an invoke without ever completing it.
    #[error("invoke abandoned by the target")]
    InvokeAbandoned,

    /// The dispatcher has exited and can't serve control requests anymore.
    #[error("event dispatcher stopped")]
    DispatcherStopped,

    /// No breakpoint is registered with the given ID.
    #[error("unknown breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),
}

/// Inconsistency between the suspend bookkeeping and a requested
/// transition.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Resume requested while nothing holds the target suspended.
    #[error("resume requested on a running target")]
    DoubleResume,

    /// A batch was delivered while the previous one was still held.
    #[error("batch #{0} delivered while the previous batch is still held")]
    BatchWhileHeld(u64),

    /// An invoke was requested on a running target.
    #[error("invoke requested on a running target")]
    InvokeWhileRunning,

    /// An invoke was requested while another one is running.
    #[error("invoke requested while another invoke is running")]
    InvokeInFlight,

    /// The target rejected a transition because it was already in the
    /// given state.
    #[error("target already {0}")]
    InvalidTargetState(ExecutionState),
}

/// Symbol lookup error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// No loaded type has the given name.
    #[error("type {0} not found")]
    TypeNotFound(String),

    /// The type has no method with the given name.
    #[error("method {method} not found in {type_name}")]
    MethodNotFound {
        /// Name of the searched type.
        type_name: String,

        /// Name of the missing method.
        method: String,
    },

    /// The type has several methods with the given name.
    #[error("method {method} is ambiguous in {type_name} ({count} overloads)")]
    AmbiguousMethod {
        /// Name of the searched type.
        type_name: String,

        /// Name of the ambiguous method.
        method: String,

        /// Number of matching overloads.
        count: usize,
    },
}

/// Result type of this crate.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
