//! This crate provides a scripted virtual machine, implementing the target
//! session interface of `softdbg-core`.
//!
//! The virtual machine replays a [Script]: threads with their stacks, types
//! with their methods, and batches of notifications reported one after the
//! other. It follows the suspend/resume rules of a real debuggee closely
//! enough to drive the event dispatcher deterministically, which makes it
//! suitable for testing and demos.
//!
//! <div class="warning">
//!
//! *No code is actually executed: invoking a method only replays the
//! behavior scripted for it.*
//!
//! </div>
//!
//! # Example
//!
//! ```
//! use softdbg_core::session::{Frame, Notification};
//! use softdbg_vm::{Script, ScriptMethod, ScriptType, ScriptedVm, Value, VmThread};
//!
//! let main = VmThread::new(1, "Main");
//!
//! let script = Script::new()
//!     .with_thread(main.clone(), [Frame::new("Program.Main")])
//!     .with_type(
//!         ScriptType::new("Program").with_method(ScriptMethod::returning("Probe", Value::Int(1))),
//!     )
//!     .with_batch([Notification::UserBreak { thread: main }])
//!     .with_batch([Notification::VmDeath { exit_code: Some(0) }]);
//!
//! let vm = ScriptedVm::new(script).unwrap();
//! assert!(!vm.is_suspended());
//! ```

mod error;
mod script;
mod session;
mod symbol;
mod thread;

pub use self::error::{Error, Result};
pub use self::script::{InvokeBehavior, Script, ScriptBatch, ScriptMethod, ScriptType, Value};
pub use self::session::{ScriptedVm, Transition};
pub use self::symbol::{VmMethod, VmType};
pub use self::thread::VmThread;
