use std::fmt;

/// Identifier of a breakpoint record, stable for the registry's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub(super) u64);

impl BreakpointId {
    /// Returns the raw value of the ID.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for BreakpointId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Relationship of a breakpoint to the live target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakpointStatus {
    /// The session the breakpoint was bound to has ended.
    Disconnected,

    /// The breakpoint is set in the target.
    Bound,

    /// The breakpoint can't be set (e.g., bad location).
    Invalid,

    /// The breakpoint isn't set yet (e.g., its code isn't loaded).
    #[default]
    NotBound,
}

/// Source location requested for a breakpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file.
    pub file: String,

    /// Source line (1-based).
    pub line: u32,
}

impl SourceLocation {
    /// Creates a source location.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Flavor of a breakpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Halts the thread which hits it.
    Breakpoint,

    /// Records a value and lets the thread continue.
    Tracepoint {
        /// Expression traced when the tracepoint is hit.
        expression: String,
    },
}

/// State of a single breakpoint.
#[derive(Clone, Debug)]
pub struct BreakpointRecord {
    pub(super) id: BreakpointId,
    pub(super) location: SourceLocation,
    pub(super) kind: BreakpointKind,
    pub(super) status: BreakpointStatus,
    pub(super) status_message: String,
    pub(super) hit_count: u64,
    pub(super) last_trace_value: Option<String>,

    /// Line override waiting for the next attach.
    pub(super) pending_line: Option<u32>,
}

impl BreakpointRecord {
    pub(super) const fn new(id: BreakpointId, location: SourceLocation, kind: BreakpointKind) -> Self {
        Self {
            id,
            location,
            kind,
            status: BreakpointStatus::NotBound,
            status_message: String::new(),
            hit_count: 0,
            last_trace_value: None,
            pending_line: None,
        }
    }

    /// Returns the ID of the breakpoint.
    pub const fn id(&self) -> BreakpointId {
        self.id
    }

    /// Returns the originally requested location.
    pub const fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Returns the flavor of the breakpoint.
    pub const fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    /// Returns the current status.
    pub const fn status(&self) -> BreakpointStatus {
        self.status
    }

    /// Returns the diagnostic message of the current status.
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Returns the hit count.
    pub const fn hit_count(&self) -> u64 {
        self.hit_count
    }

    /// Returns the last value recorded by the tracepoint.
    pub fn last_trace_value(&self) -> Option<&str> {
        self.last_trace_value.as_deref()
    }

    /// Returns the line override waiting for the next attach, if any.
    pub const fn pending_adjusted_line(&self) -> Option<u32> {
        self.pending_line
    }
}
