mod record;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use self::record::{BreakpointId, BreakpointKind, BreakpointRecord};
pub use self::record::{BreakpointStatus, SourceLocation};
use crate::error::SessionError;
use crate::handler::BreakpointObserver;
use crate::session::BreakpointHost;

/// Handler receiving the values recorded by tracepoints.
pub type TraceHandler = Box<dyn FnMut(&BreakpointRecord, &str) + Send>;

/// Sink for debugger output text, used for trace values when no
/// [TraceHandler] is registered.
pub type OutputSink = Box<dyn FnMut(&str) + Send>;

/// Handler of a custom breakpoint action.
pub type CustomAction = Box<dyn FnMut(&BreakpointRecord) -> bool + Send>;

/// Collection of breakpoint records.
///
/// Mutations go through `&mut self` and notify the registered
/// [observers](BreakpointObserver) before returning, exactly once per
/// mutation.
pub struct BreakpointRegistry<H> {
    slots: BTreeMap<BreakpointId, Slot<H>>,
    next_id: u64,
    observers: Vec<Box<dyn BreakpointObserver>>,
    trace_handler: Option<TraceHandler>,
    output: OutputSink,
    custom_actions: HashMap<String, CustomAction>,
}

struct Slot<H> {
    record: BreakpointRecord,

    /// Session the record is bound to.
    host: Option<Arc<H>>,
}

impl<H> Default for BreakpointRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> BreakpointRegistry<H> {
    /// Creates an empty registry.
    ///
    /// Until [set_output_sink](Self::set_output_sink) is called, debugger
    /// output is logged.
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next_id: 1,
            observers: Vec::new(),
            trace_handler: None,
            output: Box::new(|text| tracing::info!(output = text.trim_end(), "debugger output")),
            custom_actions: HashMap::new(),
        }
    }

    /// Registers an observer of record changes.
    pub fn add_observer(&mut self, observer: impl BreakpointObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Registers the handler of tracepoint values.
    pub fn set_trace_handler(
        &mut self,
        handler: impl FnMut(&BreakpointRecord, &str) + Send + 'static,
    ) {
        self.trace_handler = Some(Box::new(handler));
    }

    /// Replaces the debugger output sink.
    pub fn set_output_sink(&mut self, sink: impl FnMut(&str) + Send + 'static) {
        self.output = Box::new(sink);
    }

    /// Registers the handler of a custom action.
    pub fn register_custom_action(
        &mut self,
        action_id: impl Into<String>,
        action: impl FnMut(&BreakpointRecord) -> bool + Send + 'static,
    ) {
        self.custom_actions.insert(action_id.into(), Box::new(action));
    }

    /// Creates a new record, not bound to any session.
    pub fn insert(&mut self, location: SourceLocation, kind: BreakpointKind) -> BreakpointId {
        let id = BreakpointId(self.next_id);
        self.next_id += 1;

        self.slots.insert(
            id,
            Slot {
                record: BreakpointRecord::new(id, location, kind),
                host: None,
            },
        );

        id
    }

    /// Removes a record, returning its last state.
    pub fn remove(&mut self, id: BreakpointId) -> Option<BreakpointRecord> {
        self.slots.remove(&id).map(|slot| slot.record)
    }

    /// Returns a record.
    pub fn get(&self, id: BreakpointId) -> Option<&BreakpointRecord> {
        self.slots.get(&id).map(|slot| &slot.record)
    }

    /// Iterates over the records, ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointRecord> {
        self.slots.values().map(|slot| &slot.record)
    }

    /// Returns whether the record is bound to a session.
    pub fn is_attached(&self, id: BreakpointId) -> bool {
        self.slots.get(&id).is_some_and(|slot| slot.host.is_some())
    }

    /// Runs the custom action `action_id` against a record.
    ///
    /// Returns `false` if no handler is registered for the action, otherwise
    /// the handler's verdict.
    pub fn run_custom_action(&mut self, id: BreakpointId, action_id: &str) -> bool {
        let (Some(slot), Some(action)) = (self.slots.get(&id), self.custom_actions.get_mut(action_id))
        else {
            return false;
        };

        action(&slot.record)
    }
}

impl<H: BreakpointHost> BreakpointRegistry<H> {
    /// Binds a record to a live session.
    ///
    /// Observers are notified of the current status, then a pending line
    /// override is applied through the session and forgotten.
    #[tracing::instrument(name = "AttachBreakpoint", skip(self, host))]
    pub fn attach(&mut self, id: BreakpointId, host: Arc<H>) -> crate::Result<(), H::Error> {
        let slot = self.slot_mut(id)?;
        slot.host = Some(host.clone());

        let pending_line = slot.record.pending_line.take();
        let (status, message) = (slot.record.status, slot.record.status_message.clone());

        self.notify(|o| o.status_changed(id, status, &message));

        if let Some(line) = pending_line {
            tracing::debug!(line, "applying adjusted location");
            host.adjust_breakpoint_location(id, line)
                .map_err(SessionError)?;
        }

        Ok(())
    }

    /// Unbinds a record from its session, marking it as disconnected.
    pub fn detach(&mut self, id: BreakpointId) -> crate::Result<(), H::Error> {
        self.slot_mut(id)?.host = None;
        self.set_status(id, BreakpointStatus::Disconnected, "")
    }

    /// Changes the status of a record.
    pub fn set_status(
        &mut self,
        id: BreakpointId,
        status: BreakpointStatus,
        message: impl Into<String>,
    ) -> crate::Result<(), H::Error> {
        let record = &mut self.slot_mut(id)?.record;
        record.status = status;
        record.status_message = message.into();

        let message = record.status_message.clone();
        self.notify(|o| o.status_changed(id, status, &message));

        Ok(())
    }

    /// Sets the hit count of a record.
    pub fn update_hit_count(&mut self, id: BreakpointId, count: u64) -> crate::Result<(), H::Error> {
        self.slot_mut(id)?.record.hit_count = count;
        self.notify(|o| o.hit_count_changed(id, count));
        Ok(())
    }

    /// Increments the hit count of a record, returning the new count.
    pub fn record_hit(&mut self, id: BreakpointId) -> crate::Result<u64, H::Error> {
        let count = self.slot_mut(id)?.record.hit_count.saturating_add(1);
        self.update_hit_count(id, count)?;
        Ok(count)
    }

    /// Sets the last trace value of a record.
    ///
    /// A value is forwarded to the trace handler if one is registered, to
    /// the debugger output otherwise.
    pub fn update_trace_value(
        &mut self,
        id: BreakpointId,
        value: Option<String>,
    ) -> crate::Result<(), H::Error> {
        self.slot_mut(id)?.record.last_trace_value = value.clone();
        self.notify(|o| o.trace_value_changed(id, value.as_deref()));

        let Some(value) = value else {
            return Ok(());
        };

        let Some(slot) = self.slots.get(&id) else {
            return Err(crate::Error::UnknownBreakpoint(id));
        };

        match self.trace_handler.as_mut() {
            Some(handler) => handler(&slot.record, &value),
            None => (self.output)(&format!("{value}\n")),
        }

        Ok(())
    }

    /// Moves a breakpoint to another source line.
    ///
    /// A bound record is moved right away, otherwise the line is kept until
    /// the next [attach](Self::attach).
    pub fn adjust_location(&mut self, id: BreakpointId, line: u32) -> crate::Result<(), H::Error> {
        let slot = self.slot_mut(id)?;

        match slot.host.as_ref() {
            Some(host) => host
                .adjust_breakpoint_location(id, line)
                .map_err(|e| SessionError(e).into()),
            None => {
                slot.record.pending_line = Some(line);
                Ok(())
            }
        }
    }

    fn slot_mut(&mut self, id: BreakpointId) -> crate::Result<&mut Slot<H>, H::Error> {
        self.slots
            .get_mut(&id)
            .ok_or(crate::Error::UnknownBreakpoint(id))
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn BreakpointObserver)) {
        for observer in self.observers.iter_mut() {
            f(&mut **observer);
        }
    }
}
