use std::fmt;
use std::str::FromStr;

use crate::breakpoint::BreakpointId;

/// Notification reported by the debuggee.
///
/// A notification is only meaningful while its batch is being processed:
/// once the target resumes, the state it describes may be gone.
#[derive(Clone, Debug)]
pub enum Notification<T> {
    /// The virtual machine has started.
    VmStart {
        /// Initial thread.
        thread: T,
    },

    /// The virtual machine has died.
    VmDeath {
        /// Exit code of the debuggee, if known.
        exit_code: Option<i32>,
    },

    /// The connection to the virtual machine was lost.
    VmDisconnect,

    /// A thread has started.
    ThreadStart {
        /// The new thread.
        thread: T,
    },

    /// A thread is exiting.
    ThreadDeath {
        /// The exiting thread.
        thread: T,
    },

    /// An assembly was loaded.
    AssemblyLoad {
        /// Thread which loaded the assembly.
        thread: T,

        /// Name of the assembly.
        assembly: String,
    },

    /// A type was loaded.
    TypeLoad {
        /// Thread which loaded the type.
        thread: T,

        /// Full name of the type.
        type_name: String,
    },

    /// A thread hit a breakpoint.
    Breakpoint {
        /// The stopped thread.
        thread: T,

        /// Breakpoint which was hit, if it is tracked by a registry.
        breakpoint: Option<BreakpointId>,
    },

    /// A thread completed a step request.
    Step {
        /// The stepping thread.
        thread: T,
    },

    /// An exception was thrown.
    Exception {
        /// The throwing thread.
        thread: T,

        /// Full name of the exception type.
        type_name: String,
    },

    /// The debuggee requested a break (e.g., `Debugger.Break()`).
    UserBreak {
        /// Thread requesting the break.
        thread: T,
    },

    /// Any other notification.
    Other {
        /// Originating thread.
        thread: T,

        /// Kind of the notification.
        kind: EventKind,
    },
}

impl<T> Notification<T> {
    /// Returns the kind of this notification.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::VmStart { .. } => EventKind::VmStart,
            Self::VmDeath { .. } => EventKind::VmDeath,
            Self::VmDisconnect => EventKind::VmDisconnect,
            Self::ThreadStart { .. } => EventKind::ThreadStart,
            Self::ThreadDeath { .. } => EventKind::ThreadDeath,
            Self::AssemblyLoad { .. } => EventKind::AssemblyLoad,
            Self::TypeLoad { .. } => EventKind::TypeLoad,
            Self::Breakpoint { .. } => EventKind::Breakpoint,
            Self::Step { .. } => EventKind::Step,
            Self::Exception { .. } => EventKind::Exception,
            Self::UserBreak { .. } => EventKind::UserBreak,
            Self::Other { kind, .. } => *kind,
        }
    }

    /// Returns the thread this notification originates from.
    pub const fn thread(&self) -> Option<&T> {
        match self {
            Self::VmDeath { .. } | Self::VmDisconnect => None,
            Self::VmStart { thread }
            | Self::ThreadStart { thread }
            | Self::ThreadDeath { thread }
            | Self::AssemblyLoad { thread, .. }
            | Self::TypeLoad { thread, .. }
            | Self::Breakpoint { thread, .. }
            | Self::Step { thread }
            | Self::Exception { thread, .. }
            | Self::UserBreak { thread }
            | Self::Other { thread, .. } => Some(thread),
        }
    }
}

/// Ordered group of notifications, delivered atomically by one poll of the
/// target.
#[derive(Clone, Debug)]
pub struct NotificationBatch<T> {
    notifications: Vec<Notification<T>>,
}

impl<T> NotificationBatch<T> {
    /// Creates a batch from notifications in delivery order.
    pub const fn new(notifications: Vec<Notification<T>>) -> Self {
        Self { notifications }
    }

    /// Returns the number of notifications in the batch.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns whether the batch holds no notification.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Iterates over the notifications in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &Notification<T>> {
        self.notifications.iter()
    }
}

impl<T> IntoIterator for NotificationBatch<T> {
    type Item = Notification<T>;
    type IntoIter = std::vec::IntoIter<Notification<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.notifications.into_iter()
    }
}

impl<T> FromIterator<Notification<T>> for NotificationBatch<T> {
    fn from_iter<I: IntoIterator<Item = Notification<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Kind of notification known to the debugger protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[allow(missing_docs)]
    VmStart,
    #[allow(missing_docs)]
    VmDeath,
    #[allow(missing_docs)]
    ThreadStart,
    #[allow(missing_docs)]
    ThreadDeath,
    #[allow(missing_docs)]
    AppDomainCreate,
    #[allow(missing_docs)]
    AppDomainUnload,
    #[allow(missing_docs)]
    MethodEntry,
    #[allow(missing_docs)]
    MethodExit,
    #[allow(missing_docs)]
    AssemblyLoad,
    #[allow(missing_docs)]
    AssemblyUnload,
    #[allow(missing_docs)]
    Breakpoint,
    #[allow(missing_docs)]
    Step,
    #[allow(missing_docs)]
    TypeLoad,
    #[allow(missing_docs)]
    Exception,
    #[allow(missing_docs)]
    KeepAlive,
    #[allow(missing_docs)]
    UserBreak,
    #[allow(missing_docs)]
    UserLog,
    #[allow(missing_docs)]
    Crash,
    #[allow(missing_docs)]
    EncUpdate,
    #[allow(missing_docs)]
    MethodUpdate,
    #[allow(missing_docs)]
    VmDisconnect,

    /// Kind not known to this crate, identified by its wire code.
    Unknown(u8),
}

impl EventKind {
    const NAMED: [(Self, &'static str, u8); 21] = [
        (Self::VmStart, "vm-start", 0),
        (Self::VmDeath, "vm-death", 1),
        (Self::ThreadStart, "thread-start", 2),
        (Self::ThreadDeath, "thread-death", 3),
        (Self::AppDomainCreate, "app-domain-create", 4),
        (Self::AppDomainUnload, "app-domain-unload", 5),
        (Self::MethodEntry, "method-entry", 6),
        (Self::MethodExit, "method-exit", 7),
        (Self::AssemblyLoad, "assembly-load", 8),
        (Self::AssemblyUnload, "assembly-unload", 9),
        (Self::Breakpoint, "breakpoint", 10),
        (Self::Step, "step", 11),
        (Self::TypeLoad, "type-load", 12),
        (Self::Exception, "exception", 13),
        (Self::KeepAlive, "keep-alive", 14),
        (Self::UserBreak, "user-break", 15),
        (Self::UserLog, "user-log", 16),
        (Self::Crash, "crash", 17),
        (Self::EncUpdate, "enc-update", 18),
        (Self::MethodUpdate, "method-update", 19),
        (Self::VmDisconnect, "vm-disconnect", 99),
    ];

    /// Returns the kind matching a wire code.
    pub fn from_code(code: u8) -> Self {
        Self::NAMED
            .iter()
            .find_map(|(kind, _, c)| (*c == code).then_some(*kind))
            .unwrap_or(Self::Unknown(code))
    }

    /// Returns the wire code of this kind.
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown(code) => code,
            kind => Self::NAMED
                .iter()
                .find_map(|(k, _, c)| (*k == kind).then_some(*c))
                .unwrap_or_default(),
        }
    }

    /// Returns the kebab-case name of this kind, if it is known.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find_map(|(k, name, _)| (*k == self).then_some(*name))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown({})", self.code()),
        }
    }
}

/// Error returned when parsing an [EventKind] from a string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown event kind {0:?}")]
pub struct ParseEventKindError(pub String);

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    /// Parses either a kebab-case kind name or a numeric wire code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return Ok(Self::from_code(code));
        }

        Self::NAMED
            .iter()
            .find_map(|(kind, name, _)| (*name == s).then_some(*kind))
            .ok_or_else(|| ParseEventKindError(s.to_owned()))
    }
}
