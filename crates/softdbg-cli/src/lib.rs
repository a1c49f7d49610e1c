//! Crate implementing the CLI commands.

mod cli;
mod config;
mod run;
mod script;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{BreakpointConfig, ConfigError, DriverConfig, EvaluateConfig};
pub use self::config::{EventsConfig, TriggersConfig};
pub use self::run::{evaluate_check, evaluate_run, run_session};
pub use self::script::{ScriptConfig, ScriptError};
