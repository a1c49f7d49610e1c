use std::collections::HashMap;
use std::time::Duration;

use softdbg_core::breakpoint::BreakpointId;
use softdbg_core::session::{Frame, Notification, NotificationBatch, ParseEventKindError};
use softdbg_vm::{Script, ScriptMethod, ScriptType, Value, VmThread};

/// Script of the virtual machine driven by the debugger (KDL format).
#[derive(Debug, knus::Decode)]
pub struct ScriptConfig {
    /// Threads of the virtual machine.
    #[knus(children(name = "thread"))]
    pub threads: Vec<ThreadNode>,

    /// Types which can be looked up and invoked.
    #[knus(children(name = "type"))]
    pub types: Vec<TypeNode>,

    /// Batches of notifications, in the order they're reported.
    #[knus(children(name = "batch"))]
    pub batches: Vec<BatchNode>,
}

/// Scripted thread.
#[derive(Debug, knus::Decode)]
pub struct ThreadNode {
    /// Thread ID.
    #[knus(argument)]
    pub id: u64,

    /// Thread name.
    #[knus(argument)]
    pub name: String,

    /// Stack frames, innermost first.
    #[knus(children(name = "frame"))]
    pub frames: Vec<FrameNode>,
}

/// Stack frame of a scripted thread.
#[derive(Debug, knus::Decode)]
pub struct FrameNode {
    /// Full name of the executing method.
    #[knus(argument)]
    pub method: String,

    /// Source file.
    #[knus(property)]
    pub file: Option<String>,

    /// Source line.
    #[knus(property)]
    pub line: Option<u32>,
}

/// Scripted type.
#[derive(Debug, knus::Decode)]
pub struct TypeNode {
    /// Full name of the type.
    #[knus(argument)]
    pub full_name: String,

    /// Methods of the type.
    #[knus(children(name = "method"))]
    pub methods: Vec<MethodNode>,
}

/// Scripted method.
///
/// At most one of `returns`, `returns-str`, `returns-bool`, `throws` and
/// `hangs` may be given. A method without any of them returns `void`.
#[derive(Debug, knus::Decode)]
pub struct MethodNode {
    /// Name of the method.
    #[knus(argument)]
    pub name: String,

    /// Integer returned by the method.
    #[knus(property)]
    pub returns: Option<i64>,

    /// String returned by the method.
    #[knus(property)]
    pub returns_str: Option<String>,

    /// Boolean returned by the method.
    #[knus(property)]
    pub returns_bool: Option<bool>,

    /// Exception thrown by the method.
    #[knus(property)]
    pub throws: Option<String>,

    /// Whether the method never returns.
    #[knus(property, default)]
    pub hangs: bool,

    /// Time the method runs, in milliseconds.
    #[knus(property, default)]
    pub duration_ms: u64,

    /// Batches reported while the method runs.
    #[knus(children(name = "raise"))]
    pub raises: Vec<RaiseNode>,
}

/// Batch reported while an invoked method runs.
#[derive(Debug, knus::Decode)]
pub struct RaiseNode {
    /// Reported notifications.
    #[knus(children)]
    pub notifications: Vec<NotificationNode>,
}

/// Batch of notifications.
#[derive(Debug, knus::Decode)]
pub struct BatchNode {
    /// Time the virtual machine runs before reporting the batch, in
    /// milliseconds.
    #[knus(property, default)]
    pub delay_ms: u64,

    /// Reported notifications.
    #[knus(children)]
    pub notifications: Vec<NotificationNode>,
}

/// Notification of a batch.
#[derive(Debug, knus::Decode)]
pub enum NotificationNode {
    /// `vm-start thread=<ID>`
    VmStart(ThreadProperty),

    /// `vm-death [exit-code=<CODE>]`
    VmDeath(VmDeathNode),

    /// `vm-disconnect`
    VmDisconnect(EmptyNode),

    /// `thread-start thread=<ID>`
    ThreadStart(ThreadProperty),

    /// `thread-death thread=<ID>`
    ThreadDeath(ThreadProperty),

    /// `assembly-load "<NAME>" thread=<ID>`
    AssemblyLoad(NamedNode),

    /// `type-load "<NAME>" thread=<ID>`
    TypeLoad(NamedNode),

    /// `breakpoint thread=<ID> [id=<BREAKPOINT>]`
    Breakpoint(BreakpointNode),

    /// `step thread=<ID>`
    Step(ThreadProperty),

    /// `exception "<TYPE>" thread=<ID>`
    Exception(NamedNode),

    /// `user-break thread=<ID>`
    UserBreak(ThreadProperty),

    /// `other "<KIND>" thread=<ID>`
    Other(NamedNode),
}

/// Notification node only carrying its thread.
#[derive(Debug, knus::Decode)]
pub struct ThreadProperty {
    /// Originating thread.
    #[knus(property)]
    pub thread: u64,
}

/// Notification node carrying a name and its thread.
#[derive(Debug, knus::Decode)]
pub struct NamedNode {
    /// Assembly, type or kind name.
    #[knus(argument)]
    pub name: String,

    /// Originating thread.
    #[knus(property)]
    pub thread: u64,
}

/// `vm-death` node.
#[derive(Debug, knus::Decode)]
pub struct VmDeathNode {
    /// Exit code of the debuggee.
    #[knus(property)]
    pub exit_code: Option<i32>,
}

/// `breakpoint` node.
#[derive(Debug, knus::Decode)]
pub struct BreakpointNode {
    /// Stopped thread.
    #[knus(property)]
    pub thread: u64,

    /// Breakpoint which was hit.
    #[knus(property)]
    pub id: Option<u64>,
}

/// Node without arguments.
#[derive(Debug, knus::Decode)]
pub struct EmptyNode {}

/// Error raised by an inconsistent script.
#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ScriptError {
    /// A notification refers to an undeclared thread.
    #[error("unknown thread {0}")]
    #[diagnostic(help("threads are declared with `thread <ID> \"<NAME>\"`"))]
    UnknownThread(u64),

    /// A thread ID is declared more than once.
    #[error("thread {0} is declared more than once")]
    DuplicateThread(u64),

    /// A method has more than one behavior.
    #[error("method {type_name}.{method} has conflicting behaviors")]
    #[diagnostic(help(
        "use at most one of `returns`, `returns-str`, `returns-bool`, `throws` and `hangs`"
    ))]
    ConflictingBehavior {
        /// Full name of the declaring type.
        type_name: String,

        /// Name of the method.
        method: String,
    },

    /// Unknown kind of an `other` notification.
    #[error(transparent)]
    EventKind(#[from] ParseEventKindError),

    /// The script was rejected by the virtual machine.
    #[error(transparent)]
    Script(#[from] softdbg_vm::Error),
}

impl ScriptConfig {
    /// Builds the script of the virtual machine.
    pub fn into_script(self) -> Result<Script, ScriptError> {
        let mut threads = HashMap::new();
        let mut script = Script::new();

        for node in self.threads {
            let thread = VmThread::new(node.id, node.name);

            if threads.insert(node.id, thread.clone()).is_some() {
                return Err(ScriptError::DuplicateThread(node.id));
            }

            let frames = node.frames.into_iter().map(|frame| Frame {
                method_full_name: frame.method,
                file: frame.file,
                line: frame.line,
            });

            script = script.with_thread(thread, frames);
        }

        for node in self.types {
            let mut ty = ScriptType::new(&node.full_name);

            for method in node.methods {
                ty = ty.with_method(method.into_method(&node.full_name, &threads)?);
            }

            script = script.with_type(ty);
        }

        for node in self.batches {
            let notifications = node
                .notifications
                .into_iter()
                .map(|n| n.into_notification(&threads))
                .collect::<Result<Vec<_>, _>>()?;

            script = script.with_delayed_batch(Duration::from_millis(node.delay_ms), notifications);
        }

        script.validate()?;

        Ok(script)
    }
}

impl MethodNode {
    fn into_method(
        self,
        type_name: &str,
        threads: &HashMap<u64, VmThread>,
    ) -> Result<ScriptMethod, ScriptError> {
        let conflict = || ScriptError::ConflictingBehavior {
            type_name: type_name.to_owned(),
            method: self.name.clone(),
        };

        let values = [
            self.returns.map(Value::Int),
            self.returns_str.clone().map(Value::Str),
            self.returns_bool.map(Value::Bool),
        ];

        let mut values = values.into_iter().flatten();
        let value = values.next();

        if values.next().is_some() {
            return Err(conflict());
        }

        let duration = Duration::from_millis(self.duration_ms);

        let method = match (value, self.throws.clone(), self.hangs) {
            (None, Some(exception), false) => {
                ScriptMethod::throwing(&self.name, exception).with_duration(duration)
            }
            (None, None, true) if self.raises.is_empty() => ScriptMethod::hanging(&self.name),
            (value, None, false) if self.raises.is_empty() => {
                ScriptMethod::returning(&self.name, value.unwrap_or_default())
                    .with_duration(duration)
            }
            (value, None, false) => {
                let batches = self
                    .raises
                    .into_iter()
                    .map(|raise| {
                        raise
                            .notifications
                            .into_iter()
                            .map(|n| n.into_notification(threads))
                            .collect::<Result<Vec<_>, _>>()
                            .map(NotificationBatch::new)
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                ScriptMethod::raising(&self.name, batches, value.unwrap_or_default())
            }
            _ => return Err(conflict()),
        };

        Ok(method)
    }
}

impl NotificationNode {
    fn into_notification(
        self,
        threads: &HashMap<u64, VmThread>,
    ) -> Result<Notification<VmThread>, ScriptError> {
        let thread = |id: u64| {
            threads
                .get(&id)
                .cloned()
                .ok_or(ScriptError::UnknownThread(id))
        };

        let notification = match self {
            Self::VmStart(node) => Notification::VmStart {
                thread: thread(node.thread)?,
            },
            Self::VmDeath(node) => Notification::VmDeath {
                exit_code: node.exit_code,
            },
            Self::VmDisconnect(_) => Notification::VmDisconnect,
            Self::ThreadStart(node) => Notification::ThreadStart {
                thread: thread(node.thread)?,
            },
            Self::ThreadDeath(node) => Notification::ThreadDeath {
                thread: thread(node.thread)?,
            },
            Self::AssemblyLoad(node) => Notification::AssemblyLoad {
                thread: thread(node.thread)?,
                assembly: node.name,
            },
            Self::TypeLoad(node) => Notification::TypeLoad {
                thread: thread(node.thread)?,
                type_name: node.name,
            },
            Self::Breakpoint(node) => Notification::Breakpoint {
                thread: thread(node.thread)?,
                breakpoint: node.id.map(BreakpointId::from),
            },
            Self::Step(node) => Notification::Step {
                thread: thread(node.thread)?,
            },
            Self::Exception(node) => Notification::Exception {
                thread: thread(node.thread)?,
                type_name: node.name,
            },
            Self::UserBreak(node) => Notification::UserBreak {
                thread: thread(node.thread)?,
            },
            Self::Other(node) => Notification::Other {
                thread: thread(node.thread)?,
                kind: node.name.parse()?,
            },
        };

        Ok(notification)
    }
}
