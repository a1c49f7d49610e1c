use softdbg_core::session::{ExecutionState, TargetError};

/// Error type of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The virtual machine is already in the requested state.
    #[error("virtual machine already {0}")]
    InvalidState(ExecutionState),

    /// No thread of the script has the given ID.
    #[error("unknown thread {0}")]
    UnknownThread(u64),

    /// The virtual machine has died.
    #[error("virtual machine terminated")]
    Terminated,

    /// The invoked method threw.
    #[error("invoked method threw: {0}")]
    InvokeFailed(String),

    /// The script is inconsistent.
    #[error("bad script: {0}")]
    Script(String),
}

impl TargetError for Error {
    fn invalid_state(&self) -> Option<ExecutionState> {
        match self {
            Self::InvalidState(state) => Some(*state),
            _ => None,
        }
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
