use std::sync::Arc;

use softdbg_core::session::ThreadRef;

/// Thread of the scripted virtual machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmThread {
    id: u64,
    name: Arc<str>,
}

impl VmThread {
    /// Creates a thread handle.
    pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl ThreadRef for VmThread {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
