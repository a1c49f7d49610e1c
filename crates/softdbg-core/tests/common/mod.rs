use std::sync::Arc;

use softdbg_core::dispatcher::{self, DispatchSummary, SessionControl, TriggerConfig};
use softdbg_core::handler::{BreakContext, BreakHandler};
use softdbg_core::session::{EventKind, Frame, Notification, NotificationBatch};
use softdbg_vm::{Script, ScriptMethod, ScriptType, ScriptedVm, Value, VmThread};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type DispatchResult = softdbg_core::Result<DispatchSummary, softdbg_vm::Error>;

pub fn main_thread() -> VmThread {
    VmThread::new(1, "Main")
}

pub fn worker_thread() -> VmThread {
    VmThread::new(2, "Worker")
}

pub fn other(thread: VmThread) -> Notification<VmThread> {
    Notification::Other {
        thread,
        kind: EventKind::KeepAlive,
    }
}

pub fn user_break(thread: VmThread) -> Notification<VmThread> {
    Notification::UserBreak { thread }
}

pub fn death(exit_code: i32) -> Notification<VmThread> {
    Notification::VmDeath {
        exit_code: Some(exit_code),
    }
}

/// Script with two threads and a `Demo.Program` type, but no batch.
pub fn base_script() -> Script {
    Script::new()
        .with_thread(
            main_thread(),
            [Frame::new("Demo.Program.Loop"), Frame::new("Demo.Program.Main")],
        )
        .with_thread(worker_thread(), [Frame::new("Demo.Worker.Run")])
        .with_type(
            ScriptType::new("Demo.Program")
                .with_method(ScriptMethod::returning("Probe", Value::Int(42)))
                .with_method(ScriptMethod::throwing("Crash", "System.InvalidOperationException"))
                .with_method(ScriptMethod::hanging("Stuck"))
                .with_method(ScriptMethod::raising(
                    "Reenter",
                    [NotificationBatch::new(vec![user_break(main_thread())])],
                    Value::Int(7),
                ))
                .with_method(ScriptMethod::returning("Overload", Value::Int(1)))
                .with_method(ScriptMethod::returning("Overload", Value::Int(2))),
        )
}

/// Observation of a [Recorder].
#[derive(Debug)]
pub enum Observed {
    Break(BreakContext<VmThread>),
    Processed { batch_index: u64, resumed: bool },
}

/// Break handler forwarding everything it receives.
pub struct Recorder(mpsc::UnboundedSender<Observed>);

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl BreakHandler<ScriptedVm> for Recorder {
    fn user_break(&mut self, _control: &SessionControl<ScriptedVm>, context: BreakContext<VmThread>) {
        let _ = self.0.send(Observed::Break(context));
    }

    fn batch_processed(&mut self, batch_index: u64, resumed: bool) {
        let _ = self.0.send(Observed::Processed {
            batch_index,
            resumed,
        });
    }
}

/// Drains the observations of a recorder whose dispatcher has exited.
pub async fn collect(mut observed: mpsc::UnboundedReceiver<Observed>) -> Vec<Observed> {
    let mut all = Vec::new();

    while let Some(o) = observed.recv().await {
        all.push(o);
    }

    all
}

pub fn spawn_dispatcher<H>(
    vm: &Arc<ScriptedVm>,
    handler: H,
    triggers: TriggerConfig,
    cancel: CancellationToken,
) -> (SessionControl<ScriptedVm>, JoinHandle<DispatchResult>)
where
    H: BreakHandler<ScriptedVm> + Send + 'static,
{
    let dispatcher = dispatcher::builder()
        .with_session(vm.clone())
        .with_break_handler(handler)
        .with_triggers(triggers)
        .with_cancellation(cancel)
        .build();

    let control = dispatcher.control();

    (control, tokio::spawn(dispatcher.run()))
}
