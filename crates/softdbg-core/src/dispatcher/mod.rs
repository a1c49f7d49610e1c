mod builder;
mod control;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub use self::builder::{Builder, TriggerConfig};
use self::builder::NeedsSession;
pub use self::control::{SessionControl, SuspendGrant, SuspendState};
use self::control::ControlRequest;
use crate::breakpoint::{BreakpointId, BreakpointRegistry};
use crate::error::{SessionError, Violation};
use crate::handler::{BreakContext, BreakHandler};
use crate::session::{Notification, NotificationBatch, TargetError, TargetSession, ThreadRef};

/// Single consumer of the notifications of a target session.
///
/// The dispatcher decides, for every batch, whether the target resumes. It
/// is also the only component sending suspend/resume/invoke requests to the
/// target: other components go through [SessionControl].
pub struct EventDispatcher<S: TargetSession, H> {
    /// Session the notifications are drained from.
    session: Arc<S>,

    /// Receiver of break triggers.
    handler: H,

    /// Breakpoints updated by `Breakpoint` notifications.
    registry: Option<Arc<Mutex<BreakpointRegistry<S>>>>,

    triggers: TriggerConfig,
    cancel: CancellationToken,

    /// Handle given to break handlers.
    control: SessionControl<S>,
    requests: tokio::sync::mpsc::UnboundedReceiver<ControlRequest<S>>,

    state: SuspendState,

    /// Number of batches processed so far.
    batches: u64,

    /// Thread of the last notification carrying one.
    last_thread: Option<S::Thread>,
}

/// Creates an [EventDispatcher] builder.
pub const fn builder() -> Builder<NeedsSession> {
    Builder::new()
}

/// Reason the dispatcher stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchExit {
    /// The virtual machine died.
    VmDeath {
        /// Exit code of the debuggee, if known.
        exit_code: Option<i32>,
    },

    /// The connection to the virtual machine was lost.
    VmDisconnect,

    /// The dispatcher was asked to stop.
    Cancelled,
}

/// Summary of a dispatcher run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Reason the dispatcher stopped.
    pub exit: DispatchExit,

    /// Number of batches processed.
    pub batches: u64,
}

impl<S: TargetSession, H: BreakHandler<S>> EventDispatcher<S, H> {
    /// Returns a handle for requesting transitions of the target.
    pub fn control(&self) -> SessionControl<S> {
        self.control.clone()
    }

    /// Drains notifications until the target terminates or the dispatcher
    /// is cancelled.
    ///
    /// Control requests are served between batches. On a fatal error (e.g.,
    /// a protocol violation), the loop stops and the error is returned.
    #[tracing::instrument(name = "Dispatch", skip_all)]
    pub async fn run(mut self) -> crate::Result<DispatchSummary, S::Error> {
        let cancel = self.cancel.clone();
        let mut next_batch = Box::pin(poll_batch(self.session.clone()));

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!(batches = self.batches, "dispatcher cancelled");
                    break Ok(self.summary(DispatchExit::Cancelled));
                }

                Some(request) = self.requests.recv() => {
                    self.handle_request(request)?;
                }

                batch = &mut next_batch => {
                    let batch = batch.map_err(SessionError)?;

                    self.batches += 1;

                    if let Some(exit) = self.dispatch_batch(self.batches, batch).await? {
                        tracing::info!(?exit, batches = self.batches, "target terminated");
                        break Ok(self.summary(exit));
                    }

                    next_batch = Box::pin(poll_batch(self.session.clone()));
                }
            }
        }
    }

    /// Processes a batch, returning the exit reason if the target
    /// terminated.
    #[tracing::instrument(name = "Batch", skip(self, batch), fields(len = batch.len()))]
    async fn dispatch_batch(
        &mut self,
        batch_index: u64,
        batch: NotificationBatch<S::Thread>,
    ) -> crate::Result<Option<DispatchExit>, S::Error> {
        self.state.hold_batch(batch_index)?;

        let mut should_resume = true;
        let mut exit = None;
        let mut break_context = None;

        for notification in batch {
            tracing::debug!(kind = %notification.kind(), "notification");

            if let Some(thread) = notification.thread() {
                self.last_thread = Some(thread.clone());
            }

            match notification {
                Notification::UserBreak { thread } if self.triggers.on_user_break => {
                    should_resume = false;

                    if break_context.is_some() {
                        tracing::warn!(tid = thread.id(), "extra user break in batch ignored");
                        continue;
                    }

                    let top_frame = self.top_frame(&thread);
                    tracing::info!(tid = thread.id(), top_frame = top_frame.as_deref(), "user break");

                    self.state.set_break_thread(thread.id());
                    break_context = Some(BreakContext {
                        thread,
                        top_frame,
                        batch_index,
                    });
                }
                Notification::Breakpoint {
                    breakpoint: Some(id),
                    ..
                } => record_hit(self.registry.clone(), id).await,
                Notification::VmDeath { exit_code } => {
                    exit = Some(DispatchExit::VmDeath { exit_code });
                }
                Notification::VmDisconnect => exit = Some(DispatchExit::VmDisconnect),
                _ => {}
            }
        }

        if exit.is_some() {
            return Ok(exit);
        }

        if let Some(context) = break_context {
            self.handler.user_break(&self.control, context);
        }

        if should_resume {
            self.release_batch()?;
        }

        self.handler.batch_processed(batch_index, should_resume);

        if self.triggers.after_batches == Some(batch_index) {
            match self.last_thread.clone() {
                Some(thread) => {
                    tracing::info!(tid = thread.id(), "batch count trigger");

                    let context = BreakContext {
                        thread,
                        top_frame: None,
                        batch_index,
                    };
                    self.handler.user_break(&self.control, context);
                }
                None => tracing::warn!("batch count trigger without any thread seen"),
            }
        }

        Ok(None)
    }

    fn handle_request(&mut self, request: ControlRequest<S>) -> crate::Result<(), S::Error> {
        match request {
            ControlRequest::Suspend { reply } => {
                let grant = if self.state.acquire() {
                    if let Err(e) = self.session.suspend() {
                        self.state.unacquire();
                        return Err(session_failure(e));
                    }

                    tracing::debug!("target suspended");
                    SuspendGrant::Suspended
                } else {
                    SuspendGrant::AlreadySuspended
                };

                let _ = reply.send(Ok(grant));
            }
            ControlRequest::Invoke {
                thread,
                method,
                args,
                options,
                on_complete,
                reply,
            } => {
                let res: crate::Result<(), S::Error> = match self.state.begin_invoke() {
                    Ok(()) => {
                        tracing::debug!(tid = thread.id(), "invoking");

                        self.session
                            .begin_invoke(&thread, &method, args, options, on_complete)
                            .map_err(|e| {
                                self.state.finish_invoke();
                                SessionError(e).into()
                            })
                    }
                    Err(violation) => Err(violation.into()),
                };

                let _ = reply.send(res);
            }
            ControlRequest::InvokeFinished => self.state.finish_invoke(),
            ControlRequest::Resume { reply } => match self.state.release_all() {
                Ok(()) => {
                    self.session.resume().map_err(session_failure)?;
                    tracing::debug!("target resumed on request");
                    let _ = reply.send(Ok(()));
                }
                Err(violation) => {
                    let _ = reply.send(Err(violation.into()));
                }
            },
            ControlRequest::State { reply } => {
                let _ = reply.send(self.state);
            }
        }

        Ok(())
    }

    fn release_batch(&mut self) -> crate::Result<(), S::Error> {
        if self.state.release_batch()? {
            self.session.resume().map_err(session_failure)?;
        } else {
            tracing::debug!(holds = self.state.explicit_holds(), "target kept suspended");
        }

        Ok(())
    }

    fn top_frame(&self, thread: &S::Thread) -> Option<String> {
        match self.session.frames(thread) {
            Ok(frames) => frames.into_iter().next().map(|f| f.method_full_name),
            Err(e) => {
                tracing::warn!(tid = thread.id(), error = %e, "cannot read frames");
                None
            }
        }
    }

    const fn summary(&self, exit: DispatchExit) -> DispatchSummary {
        DispatchSummary {
            exit,
            batches: self.batches,
        }
    }
}

async fn record_hit<S: TargetSession>(
    registry: Option<Arc<Mutex<BreakpointRegistry<S>>>>,
    id: BreakpointId,
) {
    let Some(registry) = registry else {
        return;
    };

    match registry.lock().await.record_hit(id) {
        Ok(count) => tracing::debug!(breakpoint = %id, count, "breakpoint hit"),
        Err(e) => tracing::warn!(breakpoint = %id, error = %e, "untracked breakpoint hit"),
    }
}

async fn poll_batch<S: TargetSession>(
    session: Arc<S>,
) -> Result<NotificationBatch<S::Thread>, S::Error> {
    session.next_event_set().await
}

/// Maps a target error to a crate error, treating state mismatches as
/// protocol violations.
fn session_failure<E: TargetError>(e: E) -> crate::Error<E> {
    match e.invalid_state() {
        Some(state) => Violation::InvalidTargetState(state).into(),
        None => SessionError(e).into(),
    }
}
