//! Fan-out of commands and fan-in of their output.
//!
//! [`merge_tail`] starts every command, formats the prefixes and hands the processes to
//! the [`MergeEngine`], which runs two readers and one exit waiter per process and writes
//! each line to the sink as soon as it arrives.
//!
//! ```text
//!   stdout reader ─┐
//!   stderr reader ─┼─► line channel ──┐
//!        ...       ┘                  ├─► select ─► sink
//!   exit waiter ───► error channel ───┘
//! ```
//!
//! Both channels close only after every participant has finished, which is observed by
//! a single latch task joining all of them.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::MergeError;
use crate::events::{Failure, MergedLine};
use crate::observer::Observer;
use crate::output::{read_stream, StreamKind, DEFAULT_MAX_LINE_BYTES};
use crate::prefix;
use crate::process::{CommandSpec, ProcessHandle};
use crate::runner::{self, KillSwitch};

/// How long teardown waits for participants after a sink failure.
const TEARDOWN_GRACE: Duration = Duration::from_millis(500);

/// Tunables of a merge run.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Paint prefixes with per-command background colors.
    pub color: bool,
    /// Longest accepted output line; longer lines are read failures.
    pub max_line_bytes: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            color: true,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Runs every command and writes their prefixed output lines to `sink`.
///
/// Returns once every output stream is drained and every process has exited. If a
/// command cannot be started, the ones started before it are killed and nothing is
/// merged. Child exit codes never make the merge fail.
pub async fn merge_tail<W>(
    commands: Vec<CommandSpec>,
    sink: &mut W,
    options: &MergeOptions,
    observer: Arc<dyn Observer>,
) -> Result<(), MergeError>
where
    W: AsyncWrite + Unpin,
{
    let mut handles = Vec::with_capacity(commands.len());
    for (index, spec) in commands.into_iter().enumerate() {
        match runner::start(index, spec) {
            Ok(handle) => {
                observer.started(index, &handle.spec, handle.pid);
                handles.push(handle);
            }
            Err(err) => {
                observer.start_failed(index, &err);
                for handle in &mut handles {
                    runner::kill(handle, observer.as_ref()).await;
                }
                return Err(err);
            }
        }
    }

    prefix::apply_prefixes(&mut handles, options.color);

    MergeEngine::new(options.clone(), observer)
        .run(handles, sink)
        .await
}

/// Multiplexes the output of started processes into one sink.
pub struct MergeEngine {
    options: MergeOptions,
    observer: Arc<dyn Observer>,
}

/// Kill switches of every supervised process; all of them fire when dropped.
///
/// Firing signals the process groups right away, so dropping a merge mid-flight leaves
/// nothing behind even if the runtime never polls the supervisors again.
struct Reaper {
    switches: Vec<KillSwitch>,
}

impl Reaper {
    fn kill_all(&mut self) {
        for switch in &mut self.switches {
            switch.fire();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.kill_all();
    }
}

impl MergeEngine {
    pub fn new(options: MergeOptions, observer: Arc<dyn Observer>) -> Self {
        Self { options, observer }
    }

    pub async fn run<W>(&self, handles: Vec<ProcessHandle>, sink: &mut W) -> Result<(), MergeError>
    where
        W: AsyncWrite + Unpin,
    {
        // Capacity 1 is the closest tokio gets to an unbuffered channel.
        let (line_tx, line_rx) = mpsc::channel::<MergedLine>(1);
        let (err_tx, err_rx) = mpsc::channel::<Failure>(1);

        let mut participants = JoinSet::new();
        let mut reaper = Reaper {
            switches: Vec::with_capacity(handles.len()),
        };
        for handle in handles {
            let ProcessHandle {
                index,
                pid,
                prefix,
                child,
                stdout,
                stderr,
                ..
            } = handle;
            let prefix: Arc<str> = Arc::from(prefix);
            if let Some(stdout) = stdout {
                participants.spawn(read_stream(
                    index,
                    StreamKind::Stdout,
                    stdout,
                    Arc::clone(&prefix),
                    line_tx.clone(),
                    err_tx.clone(),
                    self.options.max_line_bytes,
                ));
            }
            if let Some(stderr) = stderr {
                participants.spawn(read_stream(
                    index,
                    StreamKind::Stderr,
                    stderr,
                    Arc::clone(&prefix),
                    line_tx.clone(),
                    err_tx.clone(),
                    self.options.max_line_bytes,
                ));
            }
            let (switch, signal) = KillSwitch::new(pid);
            participants.spawn(runner::supervise(
                index,
                child,
                signal,
                err_tx.clone(),
                Arc::clone(&self.observer),
            ));
            reaper.switches.push(switch);
        }

        let latch = tokio::spawn(close_when_done(participants, line_tx, err_tx));
        let drained = self.drain(line_rx, err_rx, sink).await;

        match drained {
            Ok(failures) => {
                let _ = latch.await;
                drop(reaper);
                failures.into_result()
            }
            Err(err) => {
                reaper.kill_all();
                settle(latch).await;
                Err(MergeError::Sink(err))
            }
        }
    }

    // Consumes both channels until they are closed. Receivers are dropped on return,
    // which unblocks any reader still trying to push.
    async fn drain<W>(
        &self,
        mut line_rx: mpsc::Receiver<MergedLine>,
        mut err_rx: mpsc::Receiver<Failure>,
        sink: &mut W,
    ) -> io::Result<FailureTally>
    where
        W: AsyncWrite + Unpin,
    {
        let mut tally = FailureTally::default();
        let mut lines_open = true;
        let mut errors_open = true;
        while lines_open || errors_open {
            tokio::select! {
                line = line_rx.recv(), if lines_open => match line {
                    Some(line) => write_line(sink, &line).await?,
                    None => lines_open = false,
                },
                failure = err_rx.recv(), if errors_open => match failure {
                    Some(failure) => {
                        self.observer.failure(&failure);
                        tally.record(failure);
                    }
                    None => errors_open = false,
                },
            }
        }
        Ok(tally)
    }
}

// Joins every reader and waiter, then drops the last senders so both channels close.
async fn close_when_done(
    mut participants: JoinSet<()>,
    line_tx: mpsc::Sender<MergedLine>,
    err_tx: mpsc::Sender<Failure>,
) {
    while participants.join_next().await.is_some() {}
    drop(line_tx);
    drop(err_tx);
}

// Gives killed participants a moment to finish, then aborts the rest.
async fn settle(mut latch: JoinHandle<()>) {
    if tokio::time::timeout(TEARDOWN_GRACE, &mut latch).await.is_err() {
        latch.abort();
    }
}

async fn write_line<W>(sink: &mut W, line: &MergedLine) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = line.to_string().into_bytes();
    bytes.push(b'\n');
    sink.write_all(&bytes).await?;
    sink.flush().await
}

/// Running count of failures plus the first one, returned as is when it stays alone.
#[derive(Debug, Default)]
struct FailureTally {
    count: usize,
    first: Option<Failure>,
}

impl FailureTally {
    fn record(&mut self, failure: Failure) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(failure);
        }
    }

    fn into_result(self) -> Result<(), MergeError> {
        match (self.count, self.first) {
            (0, _) => Ok(()),
            (1, Some(failure)) => Err(failure.into()),
            (count, _) => Err(MergeError::Aggregate { count }),
        }
    }
}
