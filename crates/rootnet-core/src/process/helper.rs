//! Ownership of a running helper process.

use std::fmt;
use std::process::Child;
use std::sync::Arc;

use super::reaper::Reaper;

/// A spawned helper whose exit status is handed to a [`Reaper`] when the
/// guard is dropped.
///
/// Dropping the guard neither kills nor waits for the helper; helpers stop
/// on their own once their exit pipe closes.
pub struct HelperProcess {
    child: Child,
    program: &'static str,
    reaper: Arc<dyn Reaper>,
}

impl HelperProcess {
    /// Wraps a freshly spawned helper.
    #[must_use]
    pub fn new(child: Child, program: &'static str, reaper: Arc<dyn Reaper>) -> Self {
        tracing::debug!(program, pid = child.id(), "helper started");
        Self {
            child,
            program,
            reaper,
        }
    }

    /// OS process ID.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Program name used in diagnostics.
    #[must_use]
    pub const fn program(&self) -> &'static str {
        self.program
    }

    /// Mutable access to the underlying child.
    pub const fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl fmt::Debug for HelperProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperProcess")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        tracing::debug!(program = self.program, pid = self.child.id(), "releasing helper to reaper");
        self.reaper.register(self.child.id());
    }
}
