use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use softdbg_core::session::{Frame, Notification, NotificationBatch, ThreadRef};

use crate::thread::VmThread;

/// Value passed to, or returned by, an invoked method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Value {
    /// No value (`void` method).
    #[default]
    Void,

    /// Boolean value.
    Bool(bool),

    /// Integer value.
    Int(i64),

    /// String value.
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// What happens when a scripted method is invoked.
#[derive(Clone, Debug)]
pub enum InvokeBehavior {
    /// The method returns a value after running for some time.
    Return {
        /// Returned value.
        value: Value,

        /// Time the method runs.
        duration: Duration,
    },

    /// The method throws after running for some time.
    Throw {
        /// Full name of the thrown exception.
        exception: String,

        /// Time the method runs.
        duration: Duration,
    },

    /// The method never returns.
    Hang,

    /// The method reports batches (e.g., it hit a breakpoint), then returns
    /// once the virtual machine is resumed past them.
    Raise {
        /// Batches reported while the method runs.
        batches: Vec<NotificationBatch<VmThread>>,

        /// Returned value.
        value: Value,
    },
}

/// Scripted thread, along with its stack.
#[derive(Clone, Debug)]
pub struct ScriptThread {
    pub(crate) thread: VmThread,

    /// Stack frames, innermost first.
    pub(crate) frames: Vec<Frame>,
}

/// Scripted type.
#[derive(Clone, Debug)]
pub struct ScriptType {
    /// Full name of the type.
    pub full_name: String,

    /// Methods of the type, in declaration order.
    pub methods: Vec<ScriptMethod>,
}

impl ScriptType {
    /// Creates a type without methods.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            methods: Vec::new(),
        }
    }

    /// Adds a method to the type.
    pub fn with_method(mut self, method: ScriptMethod) -> Self {
        self.methods.push(method);
        self
    }
}

/// Scripted method.
#[derive(Clone, Debug)]
pub struct ScriptMethod {
    /// Name of the method.
    pub name: String,

    /// What happens when the method is invoked.
    pub behavior: InvokeBehavior,
}

impl ScriptMethod {
    /// Creates a method returning `value` right away.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behavior: InvokeBehavior::Return {
                value,
                duration: Duration::ZERO,
            },
        }
    }

    /// Creates a method throwing `exception` right away.
    pub fn throwing(name: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: InvokeBehavior::Throw {
                exception: exception.into(),
                duration: Duration::ZERO,
            },
        }
    }

    /// Creates a method which never returns.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: InvokeBehavior::Hang,
        }
    }

    /// Creates a method reporting `batches` before returning `value`.
    pub fn raising(
        name: impl Into<String>,
        batches: impl IntoIterator<Item = NotificationBatch<VmThread>>,
        value: Value,
    ) -> Self {
        Self {
            name: name.into(),
            behavior: InvokeBehavior::Raise {
                batches: batches.into_iter().collect(),
                value,
            },
        }
    }

    /// Specifies the time the method runs before returning or throwing.
    pub fn with_duration(mut self, run_for: Duration) -> Self {
        match &mut self.behavior {
            InvokeBehavior::Return { duration, .. } | InvokeBehavior::Throw { duration, .. } => {
                *duration = run_for;
            }
            InvokeBehavior::Hang | InvokeBehavior::Raise { .. } => {}
        }
        self
    }
}

/// Scripted batch.
#[derive(Clone, Debug)]
pub struct ScriptBatch {
    /// Time the virtual machine runs before reporting the batch.
    pub delay: Duration,

    /// Reported notifications.
    pub batch: NotificationBatch<VmThread>,
}

/// Script of a [ScriptedVm](crate::ScriptedVm).
///
/// Batches are reported in order, each one once the virtual machine is
/// running again after the previous one.
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub(crate) threads: IndexMap<u64, ScriptThread>,
    pub(crate) types: Vec<ScriptType>,
    pub(crate) batches: Vec<ScriptBatch>,
}

impl Script {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a thread with its stack frames (innermost first).
    pub fn with_thread(mut self, thread: VmThread, frames: impl IntoIterator<Item = Frame>) -> Self {
        let frames = frames.into_iter().collect();
        self.threads
            .insert(thread.id(), ScriptThread { thread, frames });
        self
    }

    /// Adds a type.
    pub fn with_type(mut self, ty: ScriptType) -> Self {
        self.types.push(ty);
        self
    }

    /// Adds a batch reported right after the previous one is resumed.
    pub fn with_batch(self, notifications: impl IntoIterator<Item = Notification<VmThread>>) -> Self {
        self.with_delayed_batch(Duration::ZERO, notifications)
    }

    /// Adds a batch reported once the virtual machine ran for `delay`
    /// after the previous one.
    pub fn with_delayed_batch(
        mut self,
        delay: Duration,
        notifications: impl IntoIterator<Item = Notification<VmThread>>,
    ) -> Self {
        self.batches.push(ScriptBatch {
            delay,
            batch: notifications.into_iter().collect(),
        });
        self
    }

    /// Returns the number of scripted threads.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Returns the number of scripted types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Returns the number of scripted batches.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Checks the consistency of the script.
    ///
    /// Every notification must originate from a scripted thread, and no
    /// batch may follow the termination of the virtual machine.
    pub fn validate(&self) -> crate::Result<()> {
        let raised = self.types.iter().flat_map(|ty| &ty.methods).flat_map(|m| {
            match &m.behavior {
                InvokeBehavior::Raise { batches, .. } => batches.as_slice(),
                _ => &[],
            }
        });

        for batch in self.batches.iter().map(|b| &b.batch).chain(raised) {
            for notification in batch.iter() {
                if let Some(thread) = notification.thread() {
                    if !self.threads.contains_key(&thread.id()) {
                        return Err(crate::Error::UnknownThread(thread.id()));
                    }
                }
            }
        }

        let terminal = self.batches.iter().position(|b| {
            b.batch.iter().any(|n| {
                matches!(n, Notification::VmDeath { .. } | Notification::VmDisconnect)
            })
        });

        match terminal {
            Some(pos) if pos + 1 < self.batches.len() => Err(crate::Error::Script(format!(
                "batch {} follows the termination of the virtual machine",
                pos + 2
            ))),
            _ => Ok(()),
        }
    }
}
