use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::control::{SessionControl, SuspendState};
use super::EventDispatcher;
use crate::breakpoint::BreakpointRegistry;
use crate::handler::BreakHandler;
use crate::session::TargetSession;

/// Builder for [EventDispatcher].
///
/// It is usually created by calling [builder](super::builder), and allows to specify
/// which session to drain and which handler receives break triggers.
pub struct Builder<S> {
    state: S,
}

impl Default for Builder<NeedsSession> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<NeedsSession> {
    /// Creates a dispatcher builder.
    pub const fn new() -> Self {
        Self {
            state: NeedsSession,
        }
    }

    /// Specifies the session to drain notifications from.
    pub fn with_session<S: TargetSession>(self, session: Arc<S>) -> Builder<NeedsHandler<S>> {
        Builder {
            state: NeedsHandler { session },
        }
    }
}

impl<S: TargetSession> Builder<NeedsHandler<S>> {
    /// Specifies the handler of break triggers.
    pub fn with_break_handler<H: BreakHandler<S>>(self, handler: H) -> Builder<Ready<S, H>> {
        Builder {
            state: Ready {
                session: self.state.session,
                handler,
                registry: None,
                triggers: TriggerConfig::default(),
                cancel: CancellationToken::new(),
            },
        }
    }
}

impl<S: TargetSession, H> Builder<Ready<S, H>> {
    /// Specifies a breakpoint registry, whose hit counts are updated by
    /// `Breakpoint` notifications.
    pub fn with_registry(mut self, registry: Arc<Mutex<BreakpointRegistry<S>>>) -> Self {
        self.state.registry = Some(registry);
        self
    }

    /// Specifies what fires break triggers.
    pub fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.state.triggers = triggers;
        self
    }

    /// Specifies a token for stopping the dispatcher.
    ///
    /// The dispatcher exits at the next batch boundary once the token is
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.state.cancel = token;
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> EventDispatcher<S, H> {
        let (control, requests) = SessionControl::channel();

        EventDispatcher {
            session: self.state.session,
            handler: self.state.handler,
            registry: self.state.registry,
            triggers: self.state.triggers,
            cancel: self.state.cancel,
            control,
            requests,
            state: SuspendState::default(),
            batches: 0,
            last_thread: None,
        }
    }
}

/// Configuration of what fires break triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerConfig {
    /// `UserBreak` notifications fire a trigger and keep the target
    /// suspended.
    pub on_user_break: bool,

    /// A trigger fires once, right after the given number of batches was
    /// processed, with the last thread seen.
    ///
    /// This doesn't suspend the target: it is meant to reproduce an
    /// evaluation racing a running target, mostly for testing.
    pub after_batches: Option<u64>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            on_user_break: true,
            after_batches: None,
        }
    }
}

pub struct NeedsSession;

pub struct NeedsHandler<S> {
    session: Arc<S>,
}

pub struct Ready<S: TargetSession, H> {
    session: Arc<S>,
    handler: H,
    registry: Option<Arc<Mutex<BreakpointRegistry<S>>>>,
    triggers: TriggerConfig,
    cancel: CancellationToken,
}
