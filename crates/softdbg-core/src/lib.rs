//! This crate implements the control core of a soft debugger attached to a
//! managed virtual machine.
//!
//! Three main components are provided:
//! - An [event dispatcher](self::dispatcher::EventDispatcher), single
//!   consumer of the notifications reported by the target, deciding for
//!   every batch whether the target resumes.
//! - An [evaluation coordinator](self::coordinator::EvaluationCoordinator),
//!   reacting to break triggers by invoking a method in the suspended
//!   target.
//! - A [breakpoint registry](self::breakpoint::BreakpointRegistry), keeping
//!   track of breakpoints and notifying observers of their changes.
//!
//! # Driving a target
//!
//! The target is reached through the [TargetSession](self::session::TargetSession)
//! trait. Once built, the dispatcher is the only component sending
//! suspend/resume/invoke requests to the target: everything else goes
//! through a [SessionControl](self::dispatcher::SessionControl).
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use softdbg_core::coordinator::{CoordinatorConfig, EvaluationCoordinator};
//! use softdbg_core::dispatcher;
//! use softdbg_vm::{Script, ScriptedVm};
//!
//! #[tokio::main]
//! async fn main() {
//!     let vm = Arc::new(ScriptedVm::new(Script::default()).unwrap());
//!
//!     // evaluate `Program.Probe()` whenever the debuggee breaks
//!     let config = CoordinatorConfig::new("Program", "Probe")
//!         .with_delay(Duration::from_millis(500));
//!
//!     let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();
//!
//!     let dispatcher = dispatcher::builder()
//!         .with_session(vm)
//!         .with_break_handler(coordinator)
//!         .build();
//!
//!     let control = dispatcher.control();
//!
//!     let task = tokio::spawn(dispatcher.run());
//!
//!     while let Some(report) = reports.recv().await {
//!         println!("{report:?}");
//!
//!         // let the debuggee continue after the evaluation
//!         control.resume().await.ok();
//!     }
//!
//!     let summary = task.await.unwrap().unwrap();
//!     println!("{summary:?}");
//! }
//! ```

/// Module containing the breakpoint registry.
pub mod breakpoint;

/// Module implementing the evaluation coordinator.
pub mod coordinator;

/// Module implementing the event dispatcher.
pub mod dispatcher;

mod error;

/// Module containing traits for reacting to dispatcher and registry events.
pub mod handler;

/// Module containing traits for implementing a target session.
pub mod session;

pub use self::error::{Error, Result, SessionError, SymbolError, Violation};
