use std::fmt;

/// Trait providing functions for working with a debuggee's thread.
///
/// A thread reference is a cheap handle that stays valid for as long as the
/// thread lives, so it may outlive the notification batch it came from.
pub trait ThreadRef: Clone + fmt::Debug + Send + Sync + 'static {
    /// Returns the thread's ID.
    fn id(&self) -> u64;

    /// Returns the thread's name.
    fn name(&self) -> &str;
}

/// Stack frame of a suspended thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Full name of the method executing in this frame.
    pub method_full_name: String,

    /// Source file of the current location, if known.
    pub file: Option<String>,

    /// Source line of the current location, if known.
    pub line: Option<u32>,
}

impl Frame {
    /// Creates a frame without source location.
    pub fn new(method_full_name: impl Into<String>) -> Self {
        Self {
            method_full_name: method_full_name.into(),
            file: None,
            line: None,
        }
    }
}
