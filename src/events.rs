//! Messages flowing from the per-process tasks to the merge loop.
//!
//! Stream readers push [`MergedLine`]s on the line channel; readers and exit waiters
//! push [`Failure`]s on the error channel.

use std::fmt;
use std::sync::Arc;

use crate::output::StreamKind;

/// A single decorated line of output from one command.
#[derive(Debug, Clone)]
pub struct MergedLine {
    /// Index of the command that produced the line.
    pub index: usize,
    /// The stream it originated from (stdout/stderr).
    pub stream: StreamKind,
    /// Formatted prefix of the command.
    pub prefix: Arc<str>,
    /// Raw line content without the line terminator.
    pub text: String,
}

impl fmt::Display for MergedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            StreamKind::Stdout => write!(f, "{} {}", self.prefix, self.text),
            StreamKind::Stderr => write!(f, "{} \u{1b}[1m{}\u{1b}[0m", self.prefix, self.text),
        }
    }
}

/// Why a running command was recorded as failed.
#[derive(Debug)]
pub enum FailureCause {
    /// Reading one of the output streams failed.
    Read {
        stream: StreamKind,
        error: std::io::Error,
    },
    /// Waiting for the process to exit failed.
    Wait(std::io::Error),
}

/// A failure recorded while the merge is running.
#[derive(Debug)]
pub struct Failure {
    /// Index of the command the failure belongs to.
    pub index: usize,
    pub cause: FailureCause,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::Read { stream, error } => {
                write!(f, "command #{}: failed to read {}: {}", self.index, stream, error)
            }
            FailureCause::Wait(error) => {
                write!(f, "command #{}: failed to wait: {}", self.index, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(stream: StreamKind) -> MergedLine {
        MergedLine {
            index: 0,
            stream,
            prefix: Arc::from("api"),
            text: "hello".to_string(),
        }
    }

    #[test]
    fn stdout_line_is_prefixed() {
        assert_eq!(line(StreamKind::Stdout).to_string(), "api hello");
    }

    #[test]
    fn stderr_line_is_emphasized() {
        assert_eq!(
            line(StreamKind::Stderr).to_string(),
            "api \u{1b}[1mhello\u{1b}[0m"
        );
    }

    #[test]
    fn failure_names_command_and_stream() {
        let failure = Failure {
            index: 2,
            cause: FailureCause::Read {
                stream: StreamKind::Stderr,
                error: std::io::Error::new(std::io::ErrorKind::InvalidData, "boom"),
            },
        };
        assert_eq!(failure.to_string(), "command #2: failed to read stderr: boom");
    }
}
