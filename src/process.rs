//! Data structures for tracking process state.
//!
//! This module defines the specification for a command (`CommandSpec`), the handle of a
//! started child (`ProcessHandle`) and the classification of how it ended (`ExitOutcome`).

use tokio::process::{Child, ChildStderr, ChildStdout};

/// Specification for a command to be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The command executable.
    pub program: String,
    /// Arguments for the command.
    pub args: Vec<String>,
    /// Raw label identifying the command's output lines.
    pub prefix: String,
}

impl CommandSpec {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            prefix: prefix.into(),
        }
    }

    /// Renders the command line the way a shell user would type it.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(1 + self.args.len());
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }
}

/// How a supervised process ended.
#[derive(Debug)]
pub enum ExitOutcome {
    /// The process terminated; `None` means it was ended by a signal.
    Exited { code: Option<i32> },
    /// Waiting on the process failed.
    AbnormalWait(std::io::Error),
}

/// A started child process together with its output streams.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Position of the command in the input order.
    pub index: usize,
    /// The command this process was started from.
    pub spec: CommandSpec,
    /// OS process ID.
    pub pid: Option<u32>,
    /// Prefix prepended to every output line; set by the prefix formatter.
    pub prefix: String,
    pub(crate) child: Child,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    pub(crate) fn new(
        index: usize,
        spec: CommandSpec,
        child: Child,
        stdout: ChildStdout,
        stderr: ChildStderr,
    ) -> Self {
        let pid = child.id();
        let prefix = spec.prefix.clone();
        Self {
            index,
            spec,
            pid,
            prefix,
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("tail", ["-f", "my log.txt"], "log");
        assert_eq!(spec.display(), "tail -f 'my log.txt'");
    }
}
