mod lookup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use self::lookup::resolve_method;
use crate::dispatcher::SessionControl;
use crate::error::SessionError;
use crate::handler::{BreakContext, BreakHandler};
use crate::session::{BreakpointHost, InvokeOptions, TargetSession, ThreadRef};

/// Behavior of the coordinator when a trigger fires while an evaluation is
/// still in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// The new trigger is reported as [dropped](EvaluationOutcome::Dropped).
    #[default]
    Drop,

    /// The new trigger is evaluated once the current evaluation completes.
    Queue,
}

/// Configuration of the evaluations performed by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Full name of the type declaring the method to invoke.
    pub type_name: String,

    /// Name of the method to invoke.
    pub method_name: String,

    /// Time waited after a trigger before acting on the target.
    pub delay: Duration,

    /// Maximum time waited for an invoke to complete.
    pub invoke_timeout: Duration,

    /// Options given to the target for every invoke.
    pub invoke_options: InvokeOptions,

    /// Behavior on overlapping triggers.
    pub overlap: OverlapPolicy,
}

impl CoordinatorConfig {
    /// Default time waited after a trigger.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    /// Default maximum time waited for an invoke.
    pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a configuration invoking `type_name.method_name`.
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            delay: Self::DEFAULT_DELAY,
            invoke_timeout: Self::DEFAULT_INVOKE_TIMEOUT,
            invoke_options: InvokeOptions::default(),
            overlap: OverlapPolicy::default(),
        }
    }

    /// Specifies the time waited after a trigger.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Specifies the maximum time waited for an invoke.
    pub const fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Specifies the options given to the target for every invoke.
    pub const fn with_invoke_options(mut self, options: InvokeOptions) -> Self {
        self.invoke_options = options;
        self
    }

    /// Specifies the behavior on overlapping triggers.
    pub const fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Outcome of a trigger.
#[derive(Debug)]
pub enum EvaluationOutcome<V, E> {
    /// The invoke completed and returned a value.
    Completed(V),

    /// The evaluation failed (e.g., unresolved method, timeout).
    Failed(crate::Error<E>),

    /// The trigger fired while another evaluation was in flight.
    Dropped,

    /// The coordinator was stopped before the evaluation completed.
    Cancelled,
}

impl<V, E> EvaluationOutcome<V, E> {
    /// Returns whether the invoke completed.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Report of a trigger, sent once its outcome is known.
#[derive(Debug)]
pub struct EvaluationReport<V, E> {
    /// ID of the thread the trigger fired on.
    pub thread_id: u64,

    /// Index of the batch that fired the trigger.
    pub batch_index: u64,

    /// Outcome of the trigger.
    pub outcome: EvaluationOutcome<V, E>,
}

/// Report type of the coordinator of a given session.
pub type SessionReport<S> =
    EvaluationReport<<S as TargetSession>::Value, <S as BreakpointHost>::Error>;

/// Coordinator of the evaluations triggered by the
/// [event dispatcher](crate::dispatcher::EventDispatcher).
///
/// On every trigger, the coordinator waits for the configured delay, makes
/// sure the target is suspended, resolves the configured method and invokes
/// it on the thread responsible for the trigger. The target is never
/// resumed by the coordinator: once an evaluation is reported, the owner
/// decides when to resume it through [SessionControl::resume].
pub struct EvaluationCoordinator<S> {
    session: Arc<S>,
    config: CoordinatorConfig,
    cancel: CancellationToken,
}

impl<S: TargetSession> EvaluationCoordinator<S> {
    /// Creates a coordinator evaluating on the given session.
    pub fn new(session: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            session,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Specifies a token for stopping the coordinator.
    ///
    /// Any evaluation in flight (or queued) when the token is cancelled is
    /// reported as [cancelled](EvaluationOutcome::Cancelled).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Spawns the coordinator's worker task.
    ///
    /// The returned handle is given to the dispatcher as its break handler.
    /// Every trigger it receives produces exactly one report on the returned
    /// receiver.
    pub fn spawn(self) -> (CoordinatorHandle<S>, mpsc::UnboundedReceiver<SessionReport<S>>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let busy = Arc::new(AtomicBool::new(false));

        let handle = CoordinatorHandle {
            jobs: jobs_tx,
            reports: reports_tx.clone(),
            busy: busy.clone(),
            overlap: self.config.overlap,
        };

        tokio::spawn(self.run(jobs_rx, reports_tx, busy));

        (handle, reports_rx)
    }

    async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<Job<S>>,
        reports: mpsc::UnboundedSender<SessionReport<S>>,
        busy: Arc<AtomicBool>,
    ) {
        loop {
            let job = tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                biased;

                () = self.cancel.cancelled() => EvaluationOutcome::Cancelled,

                res = self.evaluate(&job) => match res {
                    Ok(value) => EvaluationOutcome::Completed(value),
                    Err(e) => EvaluationOutcome::Failed(e),
                },
            };

            // a trigger racing this report must not be dropped
            busy.store(false, Ordering::Release);

            let _ = reports.send(job.report(outcome));
        }

        jobs.close();

        while let Ok(job) = jobs.try_recv() {
            let _ = reports.send(job.report(EvaluationOutcome::Cancelled));
        }

        tracing::debug!("coordinator stopped");
    }

    /// Performs the delayed suspend, lookup and invoke sequence.
    #[tracing::instrument(
        name = "Evaluate",
        skip_all,
        fields(tid = job.context.thread.id(), batch = job.context.batch_index)
    )]
    async fn evaluate(&self, job: &Job<S>) -> crate::Result<S::Value, S::Error> {
        tokio::time::sleep(self.config.delay).await;

        let grant = job.control.suspend().await?;
        tracing::debug!(?grant, "target held for evaluation");

        let method = resolve_method(
            self.session.as_ref(),
            &self.config.type_name,
            &self.config.method_name,
        )?;

        let completion = job
            .control
            .begin_invoke(
                job.context.thread.clone(),
                method,
                Vec::new(),
                self.config.invoke_options,
            )
            .await?;

        let value = match tokio::time::timeout(self.config.invoke_timeout, completion).await {
            Ok(Ok(res)) => res.map_err(SessionError)?,
            Ok(Err(_)) => return Err(crate::Error::InvokeAbandoned),
            Err(_) => {
                tracing::warn!(timeout = ?self.config.invoke_timeout, "invoke timed out");
                return Err(crate::Error::InvokeTimeout(self.config.invoke_timeout));
            }
        };

        tracing::info!(?value, "invoke completed");

        Ok(value)
    }
}

struct Job<S: TargetSession> {
    control: SessionControl<S>,
    context: BreakContext<S::Thread>,
}

impl<S: TargetSession> Job<S> {
    fn report(&self, outcome: EvaluationOutcome<S::Value, S::Error>) -> SessionReport<S> {
        EvaluationReport {
            thread_id: self.context.thread.id(),
            batch_index: self.context.batch_index,
            outcome,
        }
    }
}

/// Break handler feeding triggers to an [EvaluationCoordinator].
pub struct CoordinatorHandle<S: TargetSession> {
    jobs: mpsc::UnboundedSender<Job<S>>,
    reports: mpsc::UnboundedSender<SessionReport<S>>,

    /// An evaluation is in flight.
    busy: Arc<AtomicBool>,

    overlap: OverlapPolicy,
}

impl<S: TargetSession> Clone for CoordinatorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            reports: self.reports.clone(),
            busy: self.busy.clone(),
            overlap: self.overlap,
        }
    }
}

impl<S: TargetSession> CoordinatorHandle<S> {
    /// Returns whether an evaluation is in flight.
    ///
    /// Always false with [OverlapPolicy::Queue].
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl<S: TargetSession> BreakHandler<S> for CoordinatorHandle<S> {
    fn user_break(&mut self, control: &SessionControl<S>, context: BreakContext<S::Thread>) {
        let job = Job {
            control: control.clone(),
            context,
        };

        if self.overlap == OverlapPolicy::Drop && self.busy.swap(true, Ordering::AcqRel) {
            tracing::info!(
                tid = job.context.thread.id(),
                batch = job.context.batch_index,
                "evaluation in flight, trigger dropped"
            );

            let _ = self.reports.send(job.report(EvaluationOutcome::Dropped));
            return;
        }

        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            self.busy.store(false, Ordering::Release);
            let _ = self.reports.send(job.report(EvaluationOutcome::Cancelled));
        }
    }
}
