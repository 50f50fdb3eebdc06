//! Handle to one spawned child process.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExitStatus, Registration};

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Running,
    Exited,
}

/// A spawned child, exclusively owned by the call that spawned it.
///
/// Dropping a handle that is still running kills the child.
#[derive(Debug)]
pub struct ProcessHandle {
    pub(super) call_id: Uuid,
    pub(super) pid: u32,
    pub(super) program: String,
    pub(super) started_at: DateTime<Utc>,
    pub(super) started: Instant,
    pub(super) child: Option<Child>,
    pub(super) stdout: Option<ChildStdout>,
    pub(super) stderr: Option<ChildStderr>,
    pub(super) state: ProcessState,
    pub(super) exit: Option<ExitStatus>,
    pub(super) timeout: Option<Duration>,
    pub(super) cancel: CancellationToken,
    pub(super) shutdown: CancellationToken,
    pub(super) exited: CancellationToken,
    pub(super) registration: Option<Registration>,
    pub(super) stdin_task: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Identifier of the owning call.
    #[must_use]
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wall-clock spawn time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since spawn.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Final status, once the process has exited.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Take ownership of the stdout pipe.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take ownership of the stderr pipe.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Token fired once the exit has been observed.
    #[must_use]
    pub fn exited_token(&self) -> CancellationToken {
        self.exited.clone()
    }

    /// The call's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record the final status and release everything tied to the running
    /// process. Runs once per handle.
    pub(super) fn finish(&mut self, status: ExitStatus) {
        self.state = ProcessState::Exited;
        self.exit = Some(status);
        self.exited.cancel();
        if let Some(task) = self.stdin_task.take() {
            task.abort();
        }
        drop(self.registration.take());
    }
}
