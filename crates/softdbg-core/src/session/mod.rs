mod notification;
mod symbol;
mod thread;

use std::fmt;
use std::future::Future;

pub use self::notification::{EventKind, Notification, NotificationBatch, ParseEventKindError};
pub use self::symbol::{MethodHandle, TypeHandle};
pub use self::thread::{Frame, ThreadRef};
use crate::breakpoint::BreakpointId;

/// Trait implementing the control surface of a debuggee virtual machine.
///
/// All methods take `&self`: a session is shared between the event
/// dispatcher (which blocks on [next_event_set](Self::next_event_set)) and
/// the tasks performing evaluations. Implementors synchronize internally.
///
/// # Note
///
/// Only the [event dispatcher](crate::dispatcher::EventDispatcher) is
/// supposed to call [suspend](Self::suspend), [resume](Self::resume) and
/// [begin_invoke](Self::begin_invoke). Other components go through
/// [SessionControl](crate::dispatcher::SessionControl).
pub trait TargetSession: BreakpointHost + Send + Sync + 'static {
    /// Type of a reference to a debuggee's thread.
    type Thread: ThreadRef;

    /// Type of a loaded type of the debuggee.
    type Type: TypeHandle<Method = Self::Method>;

    /// Type of a method of a loaded type.
    type Method: MethodHandle;

    /// Type of a value passed to, or returned by, an invoked method.
    type Value: fmt::Debug + Send + 'static;

    /// Returns the next batch of notifications.
    ///
    /// Delivering a batch leaves the target suspended until it is resumed.
    fn next_event_set(
        &self,
    ) -> impl Future<Output = Result<NotificationBatch<Self::Thread>, Self::Error>> + Send;

    /// Resumes the target.
    ///
    /// Fails with an [invalid state](TargetError::invalid_state) error if
    /// the target is already running.
    fn resume(&self) -> Result<(), Self::Error>;

    /// Suspends the target.
    ///
    /// Fails with an [invalid state](TargetError::invalid_state) error if
    /// the target is already suspended.
    fn suspend(&self) -> Result<(), Self::Error>;

    /// Returns the debuggee's threads.
    fn threads(&self) -> Result<Vec<Self::Thread>, Self::Error>;

    /// Returns the stack frames of a suspended thread, innermost first.
    fn frames(&self, thread: &Self::Thread) -> Result<Vec<Frame>, Self::Error>;

    /// Returns the loaded types matching `name`.
    ///
    /// If `exact_match` is false, `name` may match any suffix of a type's
    /// full name.
    fn types(&self, name: &str, exact_match: bool) -> Result<Vec<Self::Type>, Self::Error>;

    /// Starts invoking `method` on `thread`.
    ///
    /// This function doesn't wait for the invoke to complete. The outcome is
    /// given to `on_complete`, which may be called from any thread.
    fn begin_invoke(
        &self,
        thread: &Self::Thread,
        method: &Self::Method,
        args: Vec<Self::Value>,
        options: InvokeOptions,
        on_complete: InvokeCallback<Self::Value, Self::Error>,
    ) -> Result<(), Self::Error>;

    /// Specifies which notification kinds the target delivers.
    fn enable_events(&self, kinds: &[EventKind]) -> Result<(), Self::Error>;
}

/// Trait for a live session able to move breakpoints around.
pub trait BreakpointHost {
    /// Error returned by this trait.
    type Error: TargetError;

    /// Moves a bound breakpoint to another source line, for the lifetime of
    /// this session.
    fn adjust_breakpoint_location(&self, id: BreakpointId, line: u32) -> Result<(), Self::Error>;
}

/// Trait for errors reported by a target session.
pub trait TargetError: std::error::Error + Send + Sync + 'static {
    /// Returns the state the target was already in, if this error rejects a
    /// suspend or resume request.
    fn invalid_state(&self) -> Option<ExecutionState>;
}

/// Execution state of the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    /// The target is running.
    Running,

    /// The target is suspended.
    Suspended,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Suspended => f.write_str("suspended"),
        }
    }
}

/// Options of a method invoke.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Breakpoints are not triggered while the method runs.
    pub disable_breakpoints: bool,

    /// Only the invoking thread is resumed while the method runs.
    pub single_threaded: bool,
}

/// Callback receiving the outcome of an invoke.
pub type InvokeCallback<V, E> = Box<dyn FnOnce(Result<V, E>) + Send + 'static>;
