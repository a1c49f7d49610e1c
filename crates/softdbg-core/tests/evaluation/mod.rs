use std::sync::Arc;
use std::time::Duration;

use softdbg_core::coordinator::{CoordinatorConfig, EvaluationCoordinator, EvaluationOutcome};
use softdbg_core::coordinator::{OverlapPolicy, SessionReport};
use softdbg_core::dispatcher::{DispatchExit, TriggerConfig};
use softdbg_core::session::{InvokeOptions, ThreadRef};
use softdbg_core::{Error, SessionError, SymbolError, Violation};
use softdbg_vm::{ScriptedVm, Transition, Value};
use test_log::test;
use tokio_util::sync::CancellationToken;

use crate::common::{base_script, death, main_thread, other, spawn_dispatcher};
use crate::common::{user_break, worker_thread};

/// Runs a single evaluation triggered by a `UserBreak`, then stops the
/// dispatcher.
async fn evaluate_on_break(config: CoordinatorConfig) -> (Arc<ScriptedVm>, SessionReport<ScriptedVm>) {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_batch([user_break(main_thread())]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let cancel = CancellationToken::new();

    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config)
        .with_cancellation(cancel.clone())
        .spawn();

    let (_, task) = spawn_dispatcher(&vm, coordinator, TriggerConfig::default(), cancel.clone());

    let report = reports.recv().await.unwrap();

    cancel.cancel();
    task.await.unwrap().unwrap();

    (vm, report)
}

#[test(tokio::test(start_paused = true))]
async fn evaluation_on_user_break() {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_batch([user_break(main_thread())])
        .with_batch([death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());

    let config = CoordinatorConfig::new("Demo.Program", "Probe").with_invoke_options(InvokeOptions {
        disable_breakpoints: true,
        single_threaded: true,
    });
    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();

    let (control, task) = spawn_dispatcher(
        &vm,
        coordinator,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    let report = reports.recv().await.unwrap();
    assert_eq!(report.thread_id, main_thread().id());
    assert_eq!(report.batch_index, 2);
    assert!(matches!(report.outcome, EvaluationOutcome::Completed(Value::Int(42))));

    // the coordinator leaves the target suspended
    assert!(vm.is_suspended());
    assert_eq!(
        vm.history(),
        [
            Transition::Delivered(1),
            Transition::Resumed,
            Transition::Delivered(2),
            Transition::Invoked {
                thread_id: main_thread().id(),
                method: "Demo.Program.Probe".to_owned(),
                options: InvokeOptions {
                    disable_breakpoints: true,
                    single_threaded: true,
                },
            },
        ]
    );

    control.resume().await.unwrap();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::VmDeath { exit_code: Some(0) });

    // the break already suspended the target
    assert_eq!(vm.suspend_count(), 0);
    assert_eq!(vm.resume_count(), 2);
    assert_eq!(vm.invalid_state_errors(), 0);

    // every sender is gone with the dispatcher
    assert!(reports.recv().await.is_none());
}

#[test(tokio::test(start_paused = true))]
async fn evaluation_waits_for_delay() {
    let script = base_script().with_batch([user_break(worker_thread())]);
    let vm = Arc::new(ScriptedVm::new(script).unwrap());

    let config =
        CoordinatorConfig::new("Demo.Program", "Probe").with_delay(Duration::from_secs(30));
    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();

    let cancel = CancellationToken::new();
    let (_, task) = spawn_dispatcher(&vm, coordinator, TriggerConfig::default(), cancel.clone());

    let start = tokio::time::Instant::now();
    let report = reports.recv().await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(report.thread_id, worker_thread().id());
    assert!(report.outcome.is_completed());

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[test(tokio::test(start_paused = true))]
async fn unresolved_method_is_reported() {
    let (vm, report) = evaluate_on_break(CoordinatorConfig::new("Demo.Program", "Missing")).await;

    assert!(matches!(
        report.outcome,
        EvaluationOutcome::Failed(Error::SymbolResolution(SymbolError::MethodNotFound { .. }))
    ));

    // only the first batch was resumed
    assert_eq!(vm.resume_count(), 1);
    assert_eq!(vm.invoke_count(), 0);
    assert!(vm.is_suspended());

    let (_, report) = evaluate_on_break(CoordinatorConfig::new("Program", "Probe")).await;
    assert!(matches!(
        report.outcome,
        EvaluationOutcome::Failed(Error::SymbolResolution(SymbolError::TypeNotFound(ref name)))
            if name == "Program"
    ));

    let (_, report) = evaluate_on_break(CoordinatorConfig::new("Demo.Program", "Overload")).await;
    assert!(matches!(
        report.outcome,
        EvaluationOutcome::Failed(Error::SymbolResolution(SymbolError::AmbiguousMethod {
            count: 2,
            ..
        }))
    ));
}

#[test(tokio::test(start_paused = true))]
async fn failed_invoke_is_reported() {
    let (vm, report) = evaluate_on_break(CoordinatorConfig::new("Demo.Program", "Crash")).await;

    assert!(matches!(
        report.outcome,
        EvaluationOutcome::Failed(Error::Session(SessionError(
            softdbg_vm::Error::InvokeFailed(_)
        )))
    ));
    assert_eq!(vm.invoke_count(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn invoke_timeout_leaves_target_suspended() {
    let config = CoordinatorConfig::new("Demo.Program", "Stuck")
        .with_invoke_timeout(Duration::from_secs(2));

    let (vm, report) = evaluate_on_break(config).await;

    assert!(matches!(
        report.outcome,
        EvaluationOutcome::Failed(Error::InvokeTimeout(timeout)) if timeout == Duration::from_secs(2)
    ));
    assert!(vm.is_suspended());
    assert_eq!(vm.resume_count(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn cancellation_reports_in_flight_evaluation() {
    let script = base_script().with_batch([user_break(main_thread())]);
    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let cancel = CancellationToken::new();

    let config = CoordinatorConfig::new("Demo.Program", "Stuck")
        .with_invoke_timeout(Duration::from_secs(600));
    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config)
        .with_cancellation(cancel.clone())
        .spawn();

    let (_, task) = spawn_dispatcher(&vm, coordinator, TriggerConfig::default(), cancel.clone());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(vm.invoke_count(), 1);

    cancel.cancel();

    let report = reports.recv().await.unwrap();
    assert!(matches!(report.outcome, EvaluationOutcome::Cancelled));

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::Cancelled);
    assert_eq!(vm.resume_count(), 0);
}

/// An evaluation whose invoke breaks again: the nested trigger must not
/// start another evaluation.
#[test(tokio::test(start_paused = true))]
async fn overlapping_trigger_is_dropped() {
    let config = CoordinatorConfig::new("Demo.Program", "Reenter")
        .with_invoke_timeout(Duration::from_secs(5));

    let script = base_script().with_batch([user_break(main_thread())]);
    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let cancel = CancellationToken::new();

    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();
    let busy = coordinator.clone();
    let (control, task) =
        spawn_dispatcher(&vm, coordinator, TriggerConfig::default(), cancel.clone());

    let nested = reports.recv().await.unwrap();
    assert_eq!(nested.batch_index, 2);
    assert!(matches!(nested.outcome, EvaluationOutcome::Dropped));
    assert!(busy.is_busy());

    let state = control.state().await.unwrap();
    assert!(state.is_invoking());

    let first = reports.recv().await.unwrap();
    assert_eq!(first.batch_index, 1);
    assert!(matches!(
        first.outcome,
        EvaluationOutcome::Failed(Error::InvokeTimeout(_))
    ));

    assert!(!busy.is_busy());
    assert_eq!(vm.invoke_count(), 1);
    assert!(vm.is_suspended());

    // resuming lets the invoke return
    control.resume().await.unwrap();
    assert!(!control.state().await.unwrap().is_suspended());

    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(vm.invalid_state_errors(), 0);
}

#[test(tokio::test(start_paused = true))]
async fn overlapping_trigger_is_queued() {
    let config = CoordinatorConfig::new("Demo.Program", "Reenter")
        .with_invoke_timeout(Duration::from_secs(5))
        .with_overlap(OverlapPolicy::Queue);

    let script = base_script().with_batch([user_break(main_thread())]);
    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let cancel = CancellationToken::new();

    let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();
    let (_, task) = spawn_dispatcher(&vm, coordinator, TriggerConfig::default(), cancel.clone());

    let first = reports.recv().await.unwrap();
    assert_eq!(first.batch_index, 1);
    assert!(matches!(
        first.outcome,
        EvaluationOutcome::Failed(Error::InvokeTimeout(_))
    ));

    // the queued evaluation runs once the first one is over, while the first
    // invoke is still outstanding
    let second = reports.recv().await.unwrap();
    assert_eq!(second.batch_index, 2);
    assert!(matches!(
        second.outcome,
        EvaluationOutcome::Failed(Error::ProtocolViolation(Violation::InvokeInFlight))
    ));

    // the second invoke never reached the target
    assert_eq!(vm.invoke_count(), 1);

    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(vm.invalid_state_errors(), 0);
}

/// Evaluations triggered by batch count race batches reported by a running
/// target.
#[test(tokio::test(start_paused = true))]
async fn racing_evaluation_keeps_transitions_consistent() {
    for delay_ms in [10, 50, 100, 150] {
        let script = base_script()
            .with_batch([other(main_thread())])
            .with_batch([other(worker_thread())])
            .with_delayed_batch(Duration::from_millis(50), [other(main_thread())])
            .with_delayed_batch(Duration::from_millis(50), [other(main_thread())])
            .with_delayed_batch(Duration::from_millis(200), [death(0)]);

        let vm = Arc::new(ScriptedVm::new(script).unwrap());

        let config = CoordinatorConfig::new("Demo.Program", "Probe")
            .with_delay(Duration::from_millis(delay_ms));
        let (coordinator, mut reports) = EvaluationCoordinator::new(vm.clone(), config).spawn();

        let triggers = TriggerConfig {
            on_user_break: true,
            after_batches: Some(2),
        };
        let (control, task) =
            spawn_dispatcher(&vm, coordinator, triggers, CancellationToken::new());

        let report = reports.recv().await.unwrap();
        assert_eq!(report.thread_id, worker_thread().id(), "delay {delay_ms}ms");
        assert!(report.outcome.is_completed(), "delay {delay_ms}ms: {report:?}");

        control.resume().await.unwrap();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.exit, DispatchExit::VmDeath { exit_code: Some(0) });
        assert_eq!(summary.batches, 5);

        assert_eq!(vm.invalid_state_errors(), 0, "delay {delay_ms}ms");
        assert_eq!(vm.invoke_count(), 1);
    }
}
