use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use softdbg_core::breakpoint::BreakpointId;
use softdbg_core::session::{BreakpointHost, EventKind, ExecutionState, Frame};
use softdbg_core::session::{InvokeCallback, InvokeOptions, MethodHandle};
use softdbg_core::session::{Notification, NotificationBatch, TargetSession, ThreadRef};
use tokio::sync::Notify;

use crate::script::{InvokeBehavior, Script, ScriptThread, Value};
use crate::symbol::{VmMethod, VmType};
use crate::thread::VmThread;

/// Virtual machine replaying a [Script].
///
/// The virtual machine starts running. Every reported batch suspends it,
/// and the next batch is only reported once it is resumed. Requests which
/// don't match the current state (e.g., resuming a running virtual machine)
/// are rejected and counted, so that callers can check they never happen.
pub struct ScriptedVm {
    threads: IndexMap<u64, ScriptThread>,
    types: Vec<VmType>,
    state: Mutex<VmState>,

    /// Signaled on every state change that may make a batch reportable.
    wakeup: Notify,
}

/// Transition of a [ScriptedVm], as recorded in its history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// A batch was reported (1-based index among reported batches).
    Delivered(u64),

    /// The virtual machine was resumed.
    Resumed,

    /// The virtual machine was suspended on request.
    Suspended,

    /// An invoke was started.
    Invoked {
        /// ID of the invoking thread.
        thread_id: u64,

        /// Full name of the invoked method.
        method: String,

        /// Options of the invoke.
        options: InvokeOptions,
    },
}

impl ScriptedVm {
    /// Creates a virtual machine replaying the given script.
    pub fn new(script: Script) -> crate::Result<Self> {
        script.validate()?;

        let types = script.types.iter().map(VmType::from_script).collect();

        let queue = script
            .batches
            .into_iter()
            .map(|b| PendingBatch {
                delay: b.delay,
                batch: b.batch,
                raised: false,
            })
            .collect();

        Ok(Self {
            threads: script.threads,
            types,
            state: Mutex::new(VmState::new(queue)),
            wakeup: Notify::new(),
        })
    }

    /// Returns whether the virtual machine is suspended.
    pub fn is_suspended(&self) -> bool {
        self.state().suspended
    }

    /// Returns whether the virtual machine has reported its termination.
    pub fn is_terminated(&self) -> bool {
        self.state().terminated
    }

    /// Returns the transitions of the virtual machine, in order.
    pub fn history(&self) -> Vec<Transition> {
        self.state().history.clone()
    }

    /// Returns the number of resumes.
    pub fn resume_count(&self) -> usize {
        self.count(|t| matches!(t, Transition::Resumed))
    }

    /// Returns the number of suspensions on request.
    pub fn suspend_count(&self) -> usize {
        self.count(|t| matches!(t, Transition::Suspended))
    }

    /// Returns the number of started invokes.
    pub fn invoke_count(&self) -> usize {
        self.count(|t| matches!(t, Transition::Invoked { .. }))
    }

    /// Returns the number of requests rejected because the virtual machine
    /// was already in the requested state.
    pub fn invalid_state_errors(&self) -> usize {
        self.state().invalid_state_errors
    }

    /// Returns the breakpoint moves requested so far.
    pub fn adjusted_locations(&self) -> Vec<(BreakpointId, u32)> {
        self.state().adjusted_locations.clone()
    }

    fn count(&self, f: impl Fn(&Transition) -> bool) -> usize {
        self.state().history.iter().filter(|t| f(t)).count()
    }

    fn state(&self) -> MutexGuard<'_, VmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BreakpointHost for ScriptedVm {
    type Error = crate::Error;

    fn adjust_breakpoint_location(&self, id: BreakpointId, line: u32) -> crate::Result<()> {
        let mut state = self.state();

        if state.terminated {
            return Err(crate::Error::Terminated);
        }

        tracing::debug!(breakpoint = %id, line, "breakpoint moved");
        state.adjusted_locations.push((id, line));

        Ok(())
    }
}

impl TargetSession for ScriptedVm {
    type Thread = VmThread;
    type Type = VmType;
    type Method = VmMethod;
    type Value = Value;

    async fn next_event_set(&self) -> crate::Result<NotificationBatch<VmThread>> {
        loop {
            let wakeup = self.wakeup.notified();
            tokio::pin!(wakeup);
            wakeup.as_mut().enable();

            let next = self.state().next_batch();

            match next {
                NextBatch::Ready(batch) => return Ok(batch),
                NextBatch::Terminated => return Err(crate::Error::Terminated),
                NextBatch::RunFor(delay) => tokio::time::sleep(delay).await,
                NextBatch::Wait => wakeup.await,
            }
        }
    }

    fn resume(&self) -> crate::Result<()> {
        let completion = {
            let mut state = self.state();

            if state.terminated {
                return Err(crate::Error::Terminated);
            }

            if !state.suspended {
                state.invalid_state_errors += 1;
                return Err(crate::Error::InvalidState(ExecutionState::Running));
            }

            state.suspended = false;
            state.history.push(Transition::Resumed);

            state.settle_raising_invoke()
        };

        if let Some((on_complete, value)) = completion {
            tracing::debug!("invoke returned");
            on_complete(Ok(value));
        }

        self.wakeup.notify_waiters();

        Ok(())
    }

    fn suspend(&self) -> crate::Result<()> {
        let mut state = self.state();

        if state.terminated {
            return Err(crate::Error::Terminated);
        }

        if state.suspended {
            state.invalid_state_errors += 1;
            return Err(crate::Error::InvalidState(ExecutionState::Suspended));
        }

        state.suspended = true;
        state.history.push(Transition::Suspended);

        Ok(())
    }

    fn threads(&self) -> crate::Result<Vec<VmThread>> {
        Ok(self.threads.values().map(|t| t.thread.clone()).collect())
    }

    fn frames(&self, thread: &VmThread) -> crate::Result<Vec<Frame>> {
        self.threads
            .get(&thread.id())
            .map(|t| t.frames.clone())
            .ok_or(crate::Error::UnknownThread(thread.id()))
    }

    fn types(&self, name: &str, exact_match: bool) -> crate::Result<Vec<VmType>> {
        use softdbg_core::session::TypeHandle;

        let matches = |ty: &&VmType| {
            if exact_match {
                ty.full_name() == name
            } else {
                ty.full_name().ends_with(name)
            }
        };

        Ok(self.types.iter().filter(matches).cloned().collect())
    }

    fn begin_invoke(
        &self,
        thread: &VmThread,
        method: &VmMethod,
        _args: Vec<Value>,
        options: InvokeOptions,
        on_complete: InvokeCallback<Value, crate::Error>,
    ) -> crate::Result<()> {
        let mut state = self.state();

        if state.terminated {
            return Err(crate::Error::Terminated);
        }

        if !state.suspended {
            state.invalid_state_errors += 1;
            return Err(crate::Error::InvalidState(ExecutionState::Running));
        }

        if !self.threads.contains_key(&thread.id()) {
            return Err(crate::Error::UnknownThread(thread.id()));
        }

        if state.raising.is_some() {
            return Err(crate::Error::Script("an invoke is already running".to_owned()));
        }

        tracing::debug!(tid = thread.id(), method = method.full_name(), "invoke started");

        state.history.push(Transition::Invoked {
            thread_id: thread.id(),
            method: method.full_name(),
            options,
        });

        match method.behavior() {
            InvokeBehavior::Return { value, duration } => {
                complete_after(*duration, on_complete, Ok(value.clone()));
            }
            InvokeBehavior::Throw {
                exception,
                duration,
            } => {
                let res = Err(crate::Error::InvokeFailed(exception.clone()));
                complete_after(*duration, on_complete, res);
            }
            InvokeBehavior::Hang => state.hanging.push(on_complete),
            InvokeBehavior::Raise { batches, value } => {
                for batch in batches.iter().rev() {
                    state.queue.push_front(PendingBatch {
                        delay: Duration::ZERO,
                        batch: batch.clone(),
                        raised: true,
                    });
                }

                state.raising = Some(RaisingInvoke {
                    on_complete,
                    value: value.clone(),
                    running: true,
                });

                drop(state);
                self.wakeup.notify_waiters();
            }
        }

        Ok(())
    }

    fn enable_events(&self, kinds: &[EventKind]) -> crate::Result<()> {
        tracing::debug!(?kinds, "events enabled");
        self.state().enabled = Some(kinds.to_vec());
        Ok(())
    }
}

fn complete_after(
    duration: Duration,
    on_complete: InvokeCallback<Value, crate::Error>,
    res: crate::Result<Value>,
) {
    tokio::spawn(async move {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        on_complete(res);
    });
}

struct VmState {
    suspended: bool,
    terminated: bool,
    queue: VecDeque<PendingBatch>,

    /// Kinds reported, all of them if not set.
    enabled: Option<Vec<EventKind>>,

    /// Invoke whose thread reports batches.
    raising: Option<RaisingInvoke>,

    /// Completions of invokes which never return.
    hanging: Vec<InvokeCallback<Value, crate::Error>>,

    delivered: u64,
    history: Vec<Transition>,
    invalid_state_errors: usize,
    adjusted_locations: Vec<(BreakpointId, u32)>,
}

struct PendingBatch {
    delay: Duration,
    batch: NotificationBatch<VmThread>,

    /// Reported by the thread of an invoke.
    raised: bool,
}

struct RaisingInvoke {
    on_complete: InvokeCallback<Value, crate::Error>,
    value: Value,

    /// The invoking thread runs while the rest of the VM stays suspended.
    running: bool,
}

enum NextBatch {
    Ready(NotificationBatch<VmThread>),
    RunFor(Duration),
    Wait,
    Terminated,
}

impl VmState {
    fn new(queue: VecDeque<PendingBatch>) -> Self {
        Self {
            suspended: false,
            terminated: false,
            queue,
            enabled: None,
            raising: None,
            hanging: Vec::new(),
            delivered: 0,
            history: Vec::new(),
            invalid_state_errors: 0,
            adjusted_locations: Vec::new(),
        }
    }

    fn next_batch(&mut self) -> NextBatch {
        loop {
            if self.terminated {
                return NextBatch::Terminated;
            }

            let invoke_running = self.raising.as_ref().is_some_and(|i| i.running);

            let Some(pending) = self.queue.front_mut() else {
                return NextBatch::Wait;
            };

            if self.suspended && !(pending.raised && invoke_running) {
                return NextBatch::Wait;
            }

            if !pending.delay.is_zero() {
                return NextBatch::RunFor(std::mem::take(&mut pending.delay));
            }

            let Some(pending) = self.queue.pop_front() else {
                return NextBatch::Wait;
            };

            let batch: NotificationBatch<_> = pending
                .batch
                .into_iter()
                .filter(|n| self.is_enabled(n))
                .collect();

            if batch.is_empty() {
                continue;
            }

            if pending.raised {
                if let Some(invoke) = self.raising.as_mut() {
                    invoke.running = false;
                }
            }

            self.terminated = batch.iter().any(|n| {
                matches!(n, Notification::VmDeath { .. } | Notification::VmDisconnect)
            });

            self.suspended = true;
            self.delivered += 1;
            self.history.push(Transition::Delivered(self.delivered));

            tracing::debug!(index = self.delivered, len = batch.len(), "batch reported");

            return NextBatch::Ready(batch);
        }
    }

    fn is_enabled(&self, notification: &Notification<VmThread>) -> bool {
        match notification {
            Notification::VmDeath { .. } | Notification::VmDisconnect => true,
            n => self
                .enabled
                .as_ref()
                .is_none_or(|kinds| kinds.contains(&n.kind())),
        }
    }

    /// Lets the thread of a raising invoke run again, returning the
    /// completion of the invoke once it reported all its batches.
    fn settle_raising_invoke(&mut self) -> Option<(InvokeCallback<Value, crate::Error>, Value)> {
        let more_batches = self.queue.front().is_some_and(|b| b.raised);

        match self.raising.as_mut() {
            Some(invoke) if more_batches => {
                invoke.running = true;
                None
            }
            Some(_) => self.raising.take().map(|i| (i.on_complete, i.value)),
            None => None,
        }
    }
}
