use std::sync::Arc;
use std::time::Duration;

use softdbg_core::dispatcher::{DispatchExit, TriggerConfig};
use softdbg_core::session::{ExecutionState, TargetSession, ThreadRef};
use softdbg_core::{Error, Violation};
use softdbg_vm::{ScriptedVm, Transition};
use test_log::test;
use tokio_util::sync::CancellationToken;

use crate::common::{Observed, Recorder};
use crate::common::{base_script, collect, death, main_thread, other, spawn_dispatcher};
use crate::common::{user_break, worker_thread};

#[test(tokio::test(start_paused = true))]
async fn batches_without_break_resume_once() {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_batch([other(worker_thread()), other(main_thread())])
        .with_batch([death(3)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, observed) = Recorder::new();

    let (_, task) = spawn_dispatcher(
        &vm,
        recorder,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::VmDeath { exit_code: Some(3) });
    assert_eq!(summary.batches, 3);

    assert_eq!(
        vm.history(),
        [
            Transition::Delivered(1),
            Transition::Resumed,
            Transition::Delivered(2),
            Transition::Resumed,
            Transition::Delivered(3),
        ]
    );
    assert_eq!(vm.invalid_state_errors(), 0);

    let processed: Vec<_> = collect(observed)
        .await
        .into_iter()
        .map(|o| match o {
            Observed::Processed {
                batch_index,
                resumed,
            } => (batch_index, resumed),
            Observed::Break(context) => panic!("unexpected trigger {context:?}"),
        })
        .collect();

    assert_eq!(processed, [(1, true), (2, true)]);
}

#[test(tokio::test(start_paused = true))]
async fn user_break_keeps_target_suspended() {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_batch([other(main_thread())])
        .with_batch([other(main_thread()), user_break(worker_thread())]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, mut observed) = Recorder::new();
    let cancel = CancellationToken::new();

    let (control, task) =
        spawn_dispatcher(&vm, recorder, TriggerConfig::default(), cancel.clone());

    let context = loop {
        match observed.recv().await.unwrap() {
            Observed::Break(context) => break context,
            Observed::Processed { resumed, .. } => assert!(resumed),
        }
    };

    assert_eq!(context.thread.id(), worker_thread().id());
    assert_eq!(context.top_frame.as_deref(), Some("Demo.Worker.Run"));
    assert_eq!(context.batch_index, 3);

    let state = control.state().await.unwrap();
    assert!(state.is_batch_held());
    assert_eq!(state.break_thread(), Some(worker_thread().id()));
    assert!(vm.is_suspended());

    // nothing happens until someone resumes the target
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(vm.resume_count(), 2);

    cancel.cancel();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::Cancelled);

    // no final resume on cancellation
    assert_eq!(vm.resume_count(), 2);
    assert_eq!(vm.invalid_state_errors(), 0);

    let rest = collect(observed).await;
    assert!(
        matches!(
            rest.as_slice(),
            [Observed::Processed {
                batch_index: 3,
                resumed: false
            }]
        ),
        "{rest:?}"
    );
}

#[test(tokio::test(start_paused = true))]
async fn first_user_break_of_batch_wins() {
    let script = base_script()
        .with_batch([user_break(main_thread()), user_break(worker_thread())])
        .with_batch([death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, mut observed) = Recorder::new();

    let (control, task) = spawn_dispatcher(
        &vm,
        recorder,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    let Some(Observed::Break(context)) = observed.recv().await else {
        panic!("expected a trigger");
    };
    assert_eq!(context.thread.id(), main_thread().id());

    control.resume().await.unwrap();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::VmDeath { exit_code: Some(0) });

    let triggers = collect(observed)
        .await
        .into_iter()
        .filter(|o| matches!(o, Observed::Break(_)))
        .count();
    assert_eq!(triggers, 0);

    assert_eq!(vm.resume_count(), 1);
    assert_eq!(vm.invalid_state_errors(), 0);
}

#[test(tokio::test(start_paused = true))]
async fn batch_count_trigger() {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_batch([other(worker_thread())])
        .with_batch([other(main_thread())])
        .with_batch([death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, observed) = Recorder::new();

    let triggers = TriggerConfig {
        on_user_break: true,
        after_batches: Some(2),
    };

    let (_, task) = spawn_dispatcher(&vm, recorder, triggers, CancellationToken::new());
    task.await.unwrap().unwrap();

    let contexts: Vec<_> = collect(observed)
        .await
        .into_iter()
        .filter_map(|o| match o {
            Observed::Break(context) => Some(context),
            Observed::Processed { .. } => None,
        })
        .collect();

    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].thread.id(), worker_thread().id());
    assert_eq!(contexts[0].batch_index, 2);
    assert_eq!(contexts[0].top_frame, None);

    // the trigger doesn't hold the target
    assert_eq!(vm.resume_count(), 3);
}

#[test(tokio::test(start_paused = true))]
async fn disabled_user_break_trigger() {
    let script = base_script()
        .with_batch([user_break(main_thread())])
        .with_batch([death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());

    let triggers = TriggerConfig {
        on_user_break: false,
        after_batches: None,
    };

    let (_, task) = spawn_dispatcher(&vm, (), triggers, CancellationToken::new());
    task.await.unwrap().unwrap();

    assert_eq!(vm.resume_count(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn transitions_on_running_target_are_rejected() {
    let script = base_script()
        .with_batch([other(main_thread())])
        .with_delayed_batch(Duration::from_secs(60), [death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, mut observed) = Recorder::new();

    let (control, task) = spawn_dispatcher(
        &vm,
        recorder,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    assert!(matches!(
        observed.recv().await,
        Some(Observed::Processed {
            batch_index: 1,
            resumed: true
        })
    ));

    let err = control.resume().await.unwrap_err();
    assert!(matches!(
        err,
        Error::ProtocolViolation(Violation::DoubleResume)
    ));

    let method = softdbg_core::coordinator::resolve_method(vm.as_ref(), "Demo.Program", "Probe")
        .unwrap();
    let err = control
        .begin_invoke(main_thread(), method, Vec::new(), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ProtocolViolation(Violation::InvokeWhileRunning)
    ));

    // the dispatcher keeps serving requests
    assert!(!control.state().await.unwrap().is_suspended());

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.exit, DispatchExit::VmDeath { exit_code: Some(0) });
    assert_eq!(vm.invalid_state_errors(), 0);
}

#[test(tokio::test(start_paused = true))]
async fn control_after_exit() {
    let script = base_script().with_batch([death(0)]);
    let vm = Arc::new(ScriptedVm::new(script).unwrap());

    let (control, task) = spawn_dispatcher(
        &vm,
        (),
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    task.await.unwrap().unwrap();

    assert!(matches!(
        control.suspend().await,
        Err(Error::DispatcherStopped)
    ));
    assert_eq!(vm.suspend_count(), 0);
}

#[test(tokio::test(start_paused = true))]
async fn target_resumed_behind_dispatcher_back() {
    let script = base_script()
        .with_batch([user_break(main_thread())])
        .with_delayed_batch(Duration::from_secs(60), [death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, mut observed) = Recorder::new();

    let (control, task) = spawn_dispatcher(
        &vm,
        recorder,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    assert!(matches!(observed.recv().await, Some(Observed::Break(_))));

    vm.resume().unwrap();

    assert!(matches!(
        control.resume().await,
        Err(Error::DispatcherStopped)
    ));

    let err = task.await.unwrap().unwrap_err();
    assert!(
        matches!(
            err,
            Error::ProtocolViolation(Violation::InvalidTargetState(ExecutionState::Running))
        ),
        "{err:?}"
    );
    assert_eq!(vm.invalid_state_errors(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn batch_delivered_while_held() {
    let script = base_script()
        .with_batch([user_break(main_thread())])
        .with_batch([other(worker_thread())]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let (recorder, mut observed) = Recorder::new();

    let (_, task) = spawn_dispatcher(
        &vm,
        recorder,
        TriggerConfig::default(),
        CancellationToken::new(),
    );

    assert!(matches!(observed.recv().await, Some(Observed::Break(_))));

    // the target runs again while the dispatcher still holds the first batch
    vm.resume().unwrap();

    let err = task.await.unwrap().unwrap_err();
    assert!(
        matches!(err, Error::ProtocolViolation(Violation::BatchWhileHeld(2))),
        "{err:?}"
    );
}
