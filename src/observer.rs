//! Lifecycle notifications emitted by the merge operation.
//!
//! The merge core never logs on its own. It reports to an [`Observer`] handed in by the
//! caller; [`TracingObserver`] forwards everything to `tracing`, [`NoopObserver`] drops it.

use crate::error::MergeError;
use crate::events::Failure;
use crate::process::CommandSpec;

/// Receives lifecycle events of the supervised commands.
///
/// Every hook has an empty default so implementors only override what they need.
/// Hooks are called from the merge loop and from per-process tasks, so they must be cheap.
pub trait Observer: Send + Sync {
    /// A command was spawned.
    fn started(&self, _index: usize, _spec: &CommandSpec, _pid: Option<u32>) {}

    /// A command could not be spawned; the merge is about to abort.
    fn start_failed(&self, _index: usize, _error: &MergeError) {}

    /// A command exited; `None` means it was ended by a signal.
    fn exited(&self, _index: usize, _code: Option<i32>) {}

    /// A read or wait failure was recorded.
    fn failure(&self, _failure: &Failure) {}

    /// A still-running command was forcibly terminated.
    fn killed(&self, _index: usize) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn started(&self, index: usize, spec: &CommandSpec, pid: Option<u32>) {
        tracing::debug!(index, pid, "started cmd: {}", spec.display());
    }

    fn start_failed(&self, index: usize, error: &MergeError) {
        tracing::error!(index, label = error.as_label(), "{}", error_chain(error));
    }

    fn exited(&self, index: usize, code: Option<i32>) {
        tracing::debug!(index, code, "cmd exited");
    }

    fn failure(&self, failure: &Failure) {
        tracing::error!(index = failure.index, "error: {}", failure);
    }

    fn killed(&self, index: usize) {
        tracing::debug!(index, "killed cmd");
    }
}

// Joins an error with its source chain: "outer: inner".
fn error_chain(error: &MergeError) -> String {
    let mut out = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
