use crate::breakpoint::{BreakpointId, BreakpointStatus};
use crate::dispatcher::SessionControl;
use crate::session::TargetSession;

/// Trait for reacting to break triggers delivered by the
/// [event dispatcher](crate::dispatcher::EventDispatcher).
///
/// Functions are called from the dispatcher's loop and must return quickly:
/// any long-running work (e.g., an evaluation) must be scheduled on another
/// task. The target is reached through the given [SessionControl].
pub trait BreakHandler<S: TargetSession> {
    /// Function called when a break trigger fires.
    ///
    /// For a `UserBreak` notification, the target is left suspended by the
    /// dispatcher until some actor resumes it through `control`.
    fn user_break(&mut self, _control: &SessionControl<S>, _context: BreakContext<S::Thread>) {}

    /// Function called once a batch has been fully processed.
    ///
    /// `resumed` tells whether the dispatcher released the batch.
    fn batch_processed(&mut self, _batch_index: u64, _resumed: bool) {}
}

impl<S: TargetSession> BreakHandler<S> for () {}

/// Information given along with a break trigger.
#[derive(Clone, Debug)]
pub struct BreakContext<T> {
    /// Thread responsible for the break.
    pub thread: T,

    /// Full name of the method at the top of the thread's stack, if it
    /// could be read.
    pub top_frame: Option<String>,

    /// Index (1-based) of the batch that fired the trigger.
    pub batch_index: u64,
}

/// Trait for observing changes of breakpoint records.
///
/// Observers are called synchronously by the
/// [registry](crate::breakpoint::BreakpointRegistry), before the mutating
/// call returns. They have no access to the registry itself.
pub trait BreakpointObserver: Send {
    /// Function called when the status of a breakpoint changed.
    fn status_changed(&mut self, _id: BreakpointId, _status: BreakpointStatus, _message: &str) {}

    /// Function called when the hit count of a breakpoint changed.
    fn hit_count_changed(&mut self, _id: BreakpointId, _hit_count: u64) {}

    /// Function called when the last trace value of a tracepoint changed.
    fn trace_value_changed(&mut self, _id: BreakpointId, _value: Option<&str>) {}
}
