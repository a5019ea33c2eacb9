//! Error types returned by the merge operation.

use thiserror::Error;

use crate::events::{Failure, FailureCause};
use crate::output::StreamKind;

/// Errors produced by [`crate::merge_tail`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MergeError {
    /// A command could not be launched; nothing was merged.
    #[error("failed to start command #{index} ({command})")]
    Start {
        index: usize,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The only failure of the run was a stream read error.
    #[error("failed to read {stream} of command #{index}")]
    Read {
        index: usize,
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    /// The only failure of the run was an abnormal wait.
    #[error("failed to wait on command #{index}")]
    Wait {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// More than one failure was recorded; each one was reported to the observer.
    #[error("{count} errors encountered")]
    Aggregate { count: usize },

    /// Writing to the output sink failed.
    #[error("failed to write merged output")]
    Sink(#[source] std::io::Error),
}

impl MergeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MergeError::Start { .. } => "start_failure",
            MergeError::Read { .. } => "read_failure",
            MergeError::Wait { .. } => "wait_failure",
            MergeError::Aggregate { .. } => "aggregate_failure",
            MergeError::Sink(_) => "sink_failure",
        }
    }
}

impl From<Failure> for MergeError {
    fn from(failure: Failure) -> Self {
        match failure.cause {
            FailureCause::Read { stream, error } => MergeError::Read {
                index: failure.index,
                stream,
                source: error,
            },
            FailureCause::Wait(error) => MergeError::Wait {
                index: failure.index,
                source: error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_reports_count() {
        let err = MergeError::Aggregate { count: 2 };
        assert_eq!(err.to_string(), "2 errors encountered");
        assert_eq!(err.as_label(), "aggregate_failure");
    }

    #[test]
    fn single_failure_keeps_its_cause() {
        let failure = Failure {
            index: 1,
            cause: FailureCause::Wait(std::io::Error::other("gone")),
        };
        let err = MergeError::from(failure);
        assert!(matches!(err, MergeError::Wait { index: 1, .. }));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("gone"));
    }
}
