use tokio::sync::{mpsc, oneshot};

use crate::error::Violation;
use crate::session::{InvokeCallback, InvokeOptions, TargetSession};

/// Reasons the target is currently kept suspended.
///
/// The dispatcher is the only owner of this state: every suspend, resume
/// and invoke sent to the target is decided from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuspendState {
    /// The last delivered batch hasn't been released yet.
    batch_held: bool,

    /// Number of suspensions requested through [SessionControl].
    explicit_holds: usize,

    /// An invoke is running on a thread of the target.
    invoking: bool,

    /// The running invoke has already reported a batch.
    invoke_reported: bool,

    /// ID of the thread whose `UserBreak` holds the target.
    break_thread: Option<u64>,
}

impl SuspendState {
    /// Returns whether the target is suspended.
    pub const fn is_suspended(&self) -> bool {
        self.batch_held || self.explicit_holds > 0
    }

    /// Returns whether the last delivered batch is still held.
    pub const fn is_batch_held(&self) -> bool {
        self.batch_held
    }

    /// Returns the number of explicit suspensions.
    pub const fn explicit_holds(&self) -> usize {
        self.explicit_holds
    }

    /// Returns whether an invoke is running, until its completion is
    /// delivered.
    pub const fn is_invoking(&self) -> bool {
        self.invoking
    }

    /// Returns the ID of the thread whose `UserBreak` holds the target, until
    /// the target is resumed.
    pub const fn break_thread(&self) -> Option<u64> {
        self.break_thread
    }

    pub(crate) const fn set_break_thread(&mut self, thread_id: u64) {
        self.break_thread = Some(thread_id);
    }

    /// Registers the delivery of a batch, which suspended the target.
    ///
    /// A thread running an invoke may report one batch while the target is
    /// otherwise suspended. Any other batch delivered while the previous one
    /// is held means a notification was lost.
    pub(crate) fn hold_batch(&mut self, batch_index: u64) -> Result<(), Violation> {
        if self.batch_held {
            if !self.invoking || self.invoke_reported {
                return Err(Violation::BatchWhileHeld(batch_index));
            }

            self.invoke_reported = true;
        }

        self.batch_held = true;

        Ok(())
    }

    /// Releases the current batch.
    ///
    /// Returns whether the target must be resumed.
    pub(crate) fn release_batch(&mut self) -> Result<bool, Violation> {
        if !self.batch_held {
            return Err(Violation::DoubleResume);
        }

        self.batch_held = false;

        Ok(!self.is_suspended())
    }

    /// Adds an explicit suspension.
    ///
    /// Returns whether the target must be suspended.
    pub(crate) fn acquire(&mut self) -> bool {
        let must_suspend = !self.is_suspended();
        self.explicit_holds += 1;
        must_suspend
    }

    /// Gives back an explicit suspension that couldn't be applied.
    pub(crate) fn unacquire(&mut self) {
        self.explicit_holds = self.explicit_holds.saturating_sub(1);
    }

    pub(crate) fn begin_invoke(&mut self) -> Result<(), Violation> {
        if !self.is_suspended() {
            return Err(Violation::InvokeWhileRunning);
        }

        if self.invoking {
            return Err(Violation::InvokeInFlight);
        }

        self.invoking = true;

        Ok(())
    }

    pub(crate) fn finish_invoke(&mut self) {
        self.invoking = false;
        self.invoke_reported = false;
    }

    /// Releases every suspension.
    ///
    /// Returns an error if the target isn't suspended.
    pub(crate) fn release_all(&mut self) -> Result<(), Violation> {
        if !self.is_suspended() {
            return Err(Violation::DoubleResume);
        }

        self.batch_held = false;
        self.explicit_holds = 0;
        self.break_thread = None;

        Ok(())
    }
}

/// Outcome of a suspend request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendGrant {
    /// The target was running and has been suspended.
    Suspended,

    /// The target was already suspended; no request was sent to it.
    AlreadySuspended,
}

type Reply<T, E> = oneshot::Sender<crate::Result<T, E>>;

pub(crate) enum ControlRequest<S: TargetSession> {
    Suspend {
        reply: Reply<SuspendGrant, S::Error>,
    },
    Invoke {
        thread: S::Thread,
        method: S::Method,
        args: Vec<S::Value>,
        options: InvokeOptions,
        on_complete: InvokeCallback<S::Value, S::Error>,
        reply: Reply<(), S::Error>,
    },
    InvokeFinished,
    Resume {
        reply: Reply<(), S::Error>,
    },
    State {
        reply: oneshot::Sender<SuspendState>,
    },
}

/// Handle for requesting state transitions of the target from outside the
/// [event dispatcher](super::EventDispatcher).
///
/// Requests are served by the dispatcher's loop, between two batches.
pub struct SessionControl<S: TargetSession> {
    requests: mpsc::UnboundedSender<ControlRequest<S>>,
}

impl<S: TargetSession> Clone for SessionControl<S> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
        }
    }
}

impl<S: TargetSession> SessionControl<S> {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ControlRequest<S>>) {
        let (requests, receiver) = mpsc::unbounded_channel();
        (Self { requests }, receiver)
    }

    /// Suspends the target, or adds a hold on an already suspended target.
    ///
    /// The target stays suspended until [resume](Self::resume) is called.
    pub async fn suspend(&self) -> crate::Result<SuspendGrant, S::Error> {
        self.request(|reply| ControlRequest::Suspend { reply })
            .await?
    }

    /// Starts invoking `method` on `thread`.
    ///
    /// The target must be suspended. The returned receiver yields the
    /// outcome of the invoke once the target completes it.
    pub async fn begin_invoke(
        &self,
        thread: S::Thread,
        method: S::Method,
        args: Vec<S::Value>,
        options: InvokeOptions,
    ) -> crate::Result<oneshot::Receiver<Result<S::Value, S::Error>>, S::Error> {
        let (completion_tx, completion) = oneshot::channel();
        let requests = self.requests.clone();

        let on_complete: InvokeCallback<S::Value, S::Error> = Box::new(move |res| {
            // the dispatcher may be gone already
            let _ = requests.send(ControlRequest::InvokeFinished);
            let _ = completion_tx.send(res);
        });

        self.request(|reply| ControlRequest::Invoke {
            thread,
            method,
            args,
            options,
            on_complete,
            reply,
        })
        .await??;

        Ok(completion)
    }

    /// Releases every hold and resumes the target.
    pub async fn resume(&self) -> crate::Result<(), S::Error> {
        self.request(|reply| ControlRequest::Resume { reply })
            .await?
    }

    /// Returns a snapshot of the suspend state.
    pub async fn state(&self) -> crate::Result<SuspendState, S::Error> {
        self.request(|reply| ControlRequest::State { reply }).await
    }

    async fn request<T>(
        &self,
        f: impl FnOnce(oneshot::Sender<T>) -> ControlRequest<S>,
    ) -> crate::Result<T, S::Error> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(f(reply))
            .map_err(|_| crate::Error::DispatcherStopped)?;

        response.await.map_err(|_| crate::Error::DispatcherStopped)
    }
}
