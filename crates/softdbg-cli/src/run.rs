use std::ffi::OsStr;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::IntoDiagnostic;
use softdbg_core::breakpoint::{BreakpointId, BreakpointKind, BreakpointRegistry};
use softdbg_core::breakpoint::{BreakpointStatus, SourceLocation};
use softdbg_core::coordinator::{EvaluationCoordinator, EvaluationOutcome, EvaluationReport};
use softdbg_core::dispatcher::{self, DispatchExit, DispatchSummary, TriggerConfig};
use softdbg_core::handler::BreakpointObserver;
use softdbg_core::session::TargetSession;
use softdbg_vm::{Script, ScriptedVm};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{DriverConfig, ScriptConfig};

/// Exit code of an interrupted session.
const EXIT_CANCELLED: i32 = 130;

/// Runs the subcommand for running a debugging session.
pub fn evaluate_run(config: Option<String>, script: PathBuf) -> miette::Result<i32> {
    let config = match config {
        Some(config) => parse_run_config(config)?,
        None => knus::parse("<default>", "")?,
    };

    let script = parse_script(&script)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted");
                    cancel.cancel();
                }
            }
        });

        run_session(config, script, cancel, std::io::stdout()).await
    })
}

/// Runs the subcommand for checking a script.
pub fn evaluate_check(script: PathBuf, mut out: impl Write) -> miette::Result<()> {
    let script = parse_script(&script)?;

    writeln!(
        out,
        "script OK: {} thread(s), {} type(s), {} batch(es)",
        script.thread_count(),
        script.type_count(),
        script.batch_count()
    )
    .into_diagnostic()
}

/// Drives a scripted virtual machine until it terminates, or until `cancel`
/// is cancelled.
///
/// Evaluation reports and breakpoint hit counts are written to `out`.
/// Returns the exit code of the session.
pub async fn run_session(
    config: DriverConfig,
    script: Script,
    cancel: CancellationToken,
    mut out: impl Write,
) -> miette::Result<i32> {
    let vm = Arc::new(ScriptedVm::new(script).into_diagnostic()?);

    if let Some(events) = &config.events {
        let kinds = events.event_kinds()?;
        vm.enable_events(&kinds).into_diagnostic()?;
    }

    let registry = Arc::new(Mutex::new(build_registry(&config, &vm)?));

    let builder = dispatcher::builder().with_session(vm.clone());

    let summary = match &config.evaluate {
        Some(evaluate) => {
            let (coordinator, mut reports) =
                EvaluationCoordinator::new(vm.clone(), evaluate.to_coordinator_config())
                    .with_cancellation(cancel.clone())
                    .spawn();

            let dispatcher = builder
                .with_break_handler(coordinator)
                .with_registry(registry.clone())
                .with_triggers((&config.triggers).into())
                .with_cancellation(cancel.clone())
                .build();

            let control = dispatcher.control();
            let task = tokio::spawn(dispatcher.run());

            while let Some(report) = reports.recv().await {
                write_report(&mut out, &report)?;

                let settled = matches!(
                    report.outcome,
                    EvaluationOutcome::Completed(_) | EvaluationOutcome::Failed(_)
                );

                if settled && config.resume_after_evaluation {
                    if let Err(e) = control.resume().await {
                        tracing::warn!(error = %e, "failed to resume target");
                    }
                }
            }

            task.await.into_diagnostic()?
        }
        None => {
            // nothing would ever resume a held user break
            let triggers = TriggerConfig {
                on_user_break: false,
                ..TriggerConfig::from(&config.triggers)
            };

            builder
                .with_break_handler(())
                .with_registry(registry.clone())
                .with_triggers(triggers)
                .with_cancellation(cancel.clone())
                .build()
                .run()
                .await
        }
    };

    let summary = summary.into_diagnostic()?;

    for record in registry.lock().await.iter() {
        writeln!(
            out,
            "breakpoint {} at {}:{}: {} hit(s)",
            record.id(),
            record.location().file,
            record.location().line,
            record.hit_count()
        )
        .into_diagnostic()?;
    }

    Ok(exit_code(summary))
}

fn exit_code(summary: DispatchSummary) -> i32 {
    tracing::info!(batches = summary.batches, exit = ?summary.exit, "session over");

    match summary.exit {
        DispatchExit::VmDeath { exit_code } => exit_code.unwrap_or_default(),
        DispatchExit::VmDisconnect => 1,
        DispatchExit::Cancelled => EXIT_CANCELLED,
    }
}

fn build_registry(
    config: &DriverConfig,
    vm: &Arc<ScriptedVm>,
) -> miette::Result<BreakpointRegistry<ScriptedVm>> {
    let mut registry = BreakpointRegistry::new();
    registry.add_observer(HitLogger);

    for breakpoint in &config.breakpoints {
        let kind = match &breakpoint.trace {
            Some(expression) => BreakpointKind::Tracepoint {
                expression: expression.clone(),
            },
            None => BreakpointKind::Breakpoint,
        };

        let location = SourceLocation::new(&breakpoint.file, breakpoint.line);
        let id = registry.insert(location, kind);

        registry.attach(id, vm.clone()).into_diagnostic()?;
        registry
            .set_status(id, BreakpointStatus::Bound, "")
            .into_diagnostic()?;
    }

    Ok(registry)
}

struct HitLogger;

impl BreakpointObserver for HitLogger {
    fn status_changed(&mut self, id: BreakpointId, status: BreakpointStatus, _message: &str) {
        tracing::debug!(%id, ?status, "breakpoint status changed");
    }

    fn hit_count_changed(&mut self, id: BreakpointId, hit_count: u64) {
        tracing::info!(%id, hit_count, "breakpoint hit");
    }
}

fn write_report<V: fmt::Display, E: fmt::Display>(
    mut out: impl Write,
    report: &EvaluationReport<V, E>,
) -> miette::Result<()> {
    let prefix = format!("batch #{}, thread {}", report.batch_index, report.thread_id);

    match &report.outcome {
        EvaluationOutcome::Completed(value) => writeln!(out, "{prefix}: {value}"),
        EvaluationOutcome::Failed(e) => writeln!(out, "{prefix}: failed: {e}"),
        EvaluationOutcome::Dropped => writeln!(out, "{prefix}: dropped"),
        EvaluationOutcome::Cancelled => writeln!(out, "{prefix}: cancelled"),
    }
    .into_diagnostic()
}

fn parse_run_config(config: String) -> miette::Result<DriverConfig> {
    let path = Path::new(&config);

    let config = if let Some((filename, "kdl")) = path
        .file_name()
        .and_then(OsStr::to_str)
        .zip(path.extension().and_then(OsStr::to_str))
    {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        knus::parse(filename, &content)?
    } else {
        knus::parse("<content>", &config)?
    };

    Ok(config)
}

fn parse_script(path: &Path) -> miette::Result<Script> {
    let filename = path
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("<script>");

    let content = std::fs::read_to_string(path).into_diagnostic()?;
    let config: ScriptConfig = knus::parse(filename, &content)?;

    Ok(config.into_script()?)
}
