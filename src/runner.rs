//! Process execution and supervision.
//!
//! Spawns one child per [`CommandSpec`], waits for it to exit and terminates it on
//! request. Termination is delivered through a [`KillSwitch`], which fires when dropped,
//! so a child never outlives the owner of its switch.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::error::MergeError;
use crate::events::{Failure, FailureCause};
use crate::observer::Observer;
use crate::process::{CommandSpec, ExitOutcome, ProcessHandle};

/// Spawns `spec` with piped stdout and stderr.
pub fn start(index: usize, spec: CommandSpec) -> Result<ProcessHandle, MergeError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so termination also reaches whatever the command spawned.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => return Err(start_error(index, &spec, source)),
    };
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.start_kill();
        return Err(start_error(
            index,
            &spec,
            std::io::Error::other("output pipes unavailable"),
        ));
    };
    Ok(ProcessHandle::new(index, spec, child, stdout, stderr))
}

fn start_error(index: usize, spec: &CommandSpec, source: std::io::Error) -> MergeError {
    MergeError::Start {
        index,
        command: spec.display(),
        source,
    }
}

/// Blocks until the child terminates.
///
/// A non-zero exit code is a normal exit; only a failing wait call is abnormal.
pub async fn wait(child: &mut Child) -> ExitOutcome {
    match child.wait().await {
        Ok(status) => ExitOutcome::Exited {
            code: status.code(),
        },
        Err(error) => ExitOutcome::AbnormalWait(error),
    }
}

/// Forcibly terminates a started process that has not been handed to the merge engine.
///
/// Whatever the command left running in its process group is killed as well, even when
/// the command itself has already exited.
pub async fn kill(handle: &mut ProcessHandle, observer: &dyn Observer) {
    if terminate(&mut handle.child, handle.pid).await {
        observer.killed(handle.index);
    }
}

// Kills the process group, then the child, and reaps it. Returns false if the child
// had exited already.
async fn terminate(child: &mut Child, group: Option<u32>) -> bool {
    let running = !matches!(child.try_wait(), Ok(Some(_)));
    // A group id is not reused while any member of the group is alive.
    if let Some(group) = group {
        kill_group(group);
    }
    if running {
        let _ = child.kill().await;
    }
    running
}

#[cfg(unix)]
fn kill_group(group: u32) {
    unsafe {
        let _ = libc::kill(-(group as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_group: u32) {}

/// Requests termination of one supervised process and its process group.
///
/// The group is signalled synchronously, so firing works even when the supervising task
/// never runs again. Firing is idempotent and a no-op once supervision has finished.
/// Dropping the switch fires it.
#[derive(Debug)]
pub struct KillSwitch {
    group: Option<u32>,
    settled: Arc<AtomicBool>,
    tx: Option<oneshot::Sender<()>>,
}

/// Receiving end of a [`KillSwitch`], owned by the supervising task.
#[derive(Debug)]
pub(crate) struct KillSignal {
    group: Option<u32>,
    settled: Arc<AtomicBool>,
    rx: oneshot::Receiver<()>,
}

impl KillSwitch {
    /// Creates a switch for the process group `group` (the pid of the group leader).
    pub(crate) fn new(group: Option<u32>) -> (Self, KillSignal) {
        let (tx, rx) = oneshot::channel();
        let settled = Arc::new(AtomicBool::new(false));
        let switch = Self {
            group,
            settled: Arc::clone(&settled),
            tx: Some(tx),
        };
        (switch, KillSignal { group, settled, rx })
    }

    /// Returns `true` if the request reached a process that was still supervised.
    pub fn fire(&mut self) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        if !self.settled.load(Ordering::Acquire) {
            if let Some(group) = self.group {
                kill_group(group);
            }
        }
        tx.send(()).is_ok()
    }
}

impl Drop for KillSwitch {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Waits for `child` to exit, killing it first if the switch fires.
///
/// Once the child is gone its whole process group is killed, so background jobs it left
/// behind cannot keep the output pipes open. Abnormal waits are pushed to `err_tx`;
/// normal exits are only reported to the observer.
pub(crate) async fn supervise(
    index: usize,
    mut child: Child,
    signal: KillSignal,
    err_tx: mpsc::Sender<Failure>,
    observer: Arc<dyn Observer>,
) {
    let KillSignal {
        group,
        settled,
        mut rx,
    } = signal;
    let outcome = tokio::select! {
        outcome = wait(&mut child) => outcome,
        Ok(()) = &mut rx => {
            if terminate(&mut child, group).await {
                observer.killed(index);
            }
            wait(&mut child).await
        }
    };
    if let Some(group) = group {
        kill_group(group);
    }
    settled.store(true, Ordering::Release);

    match outcome {
        ExitOutcome::Exited { code } => observer.exited(index, code),
        ExitOutcome::AbnormalWait(error) => {
            let _ = err_tx
                .send(Failure {
                    index,
                    cause: FailureCause::Wait(error),
                })
                .await;
        }
    }
}

/// Whether `pid` names a running process; zombies count as gone.
#[cfg(all(test, unix))]
pub(crate) fn pid_alive(pid: u32) -> bool {
    if unsafe { libc::kill(pid as i32, 0) } != 0 {
        return false;
    }
    // Orphans are reaped by init at its own pace; /proc shows them as zombies until then.
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().chars().next() != Some('Z'))
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Polls until `pid` is gone or five seconds have passed.
#[cfg(all(test, unix))]
pub(crate) async fn wait_gone(pid: u32) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while pid_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    true
}
