use std::time::Duration;

use softdbg_core::coordinator::{CoordinatorConfig, OverlapPolicy};
use softdbg_core::dispatcher::TriggerConfig;
use softdbg_core::session::{EventKind, InvokeOptions};

/// Configuration of a debugging session.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct DriverConfig {
    /// Method evaluated on break triggers, if any.
    #[knus(child)]
    pub evaluate: Option<EvaluateConfig>,

    /// What fires break triggers.
    #[knus(child, default)]
    pub triggers: TriggersConfig,

    /// Whether the target is resumed once an evaluation is reported.
    #[knus(child, default = true, unwrap(argument))]
    pub resume_after_evaluation: bool,

    /// Notification kinds reported by the target (all of them if unset).
    #[knus(child)]
    pub events: Option<EventsConfig>,

    /// Breakpoints tracked during the session.
    #[knus(children(name = "breakpoint"))]
    pub breakpoints: Vec<BreakpointConfig>,
}

/// Configuration of the evaluated method.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct EvaluateConfig {
    /// Full name of the type declaring the method.
    #[knus(argument)]
    pub type_name: String,

    /// Name of the method.
    #[knus(argument)]
    pub method: String,

    /// Time waited after a trigger, in milliseconds.
    #[knus(property, default = 1000)]
    pub delay_ms: u64,

    /// Maximum time waited for the invoke, in milliseconds.
    #[knus(property, default = 5000)]
    pub timeout_ms: u64,

    /// Whether triggers firing during an evaluation are queued rather than
    /// dropped.
    #[knus(property, default)]
    pub queue: bool,

    /// Whether only the invoking thread runs during the invoke.
    #[knus(property, default)]
    pub single_threaded: bool,

    /// Whether breakpoints are ignored during the invoke.
    #[knus(property, default)]
    pub disable_breakpoints: bool,
}

impl EvaluateConfig {
    /// Returns the matching coordinator configuration.
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        let overlap = if self.queue {
            OverlapPolicy::Queue
        } else {
            OverlapPolicy::Drop
        };

        CoordinatorConfig::new(&self.type_name, &self.method)
            .with_delay(Duration::from_millis(self.delay_ms))
            .with_invoke_timeout(Duration::from_millis(self.timeout_ms))
            .with_invoke_options(InvokeOptions {
                disable_breakpoints: self.disable_breakpoints,
                single_threaded: self.single_threaded,
            })
            .with_overlap(overlap)
    }
}

/// Configuration of break triggers.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct TriggersConfig {
    /// `UserBreak` notifications fire triggers.
    #[knus(property, default = true)]
    pub user_break: bool,

    /// A trigger fires after the given number of batches.
    #[knus(property)]
    pub after_batches: Option<u64>,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            user_break: true,
            after_batches: None,
        }
    }
}

impl From<&TriggersConfig> for TriggerConfig {
    fn from(config: &TriggersConfig) -> Self {
        Self {
            on_user_break: config.user_break,
            after_batches: config.after_batches,
        }
    }
}

/// Notification kinds reported by the target.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct EventsConfig {
    /// Kind names (e.g., `user-break`) or wire codes.
    #[knus(arguments)]
    pub kinds: Vec<String>,
}

impl EventsConfig {
    /// Parses the configured kinds.
    pub fn event_kinds(&self) -> Result<Vec<EventKind>, ConfigError> {
        self.kinds
            .iter()
            .map(|kind| kind.parse().map_err(ConfigError::EventKind))
            .collect()
    }
}

/// Breakpoint tracked during the session.
///
/// Breakpoints are numbered from 1 in declaration order, which is how
/// script notifications refer to them.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct BreakpointConfig {
    /// Source file.
    #[knus(argument)]
    pub file: String,

    /// Source line.
    #[knus(argument)]
    pub line: u32,

    /// Expression traced by a tracepoint.
    #[knus(property)]
    pub trace: Option<String>,
}

/// Error raised by an invalid configuration.
#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ConfigError {
    /// Unknown notification kind.
    #[error(transparent)]
    #[diagnostic(help("kinds are kebab-case names (e.g., `user-break`) or numeric codes"))]
    EventKind(#[from] softdbg_core::session::ParseEventKindError),
}
