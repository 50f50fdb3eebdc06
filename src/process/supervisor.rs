//! Spawning and supervising child processes.
//!
//! Every handle returned by [`ProcessSupervisor::spawn`] is meant to be
//! matched by one [`ProcessSupervisor::wait`]. A handle dropped without a
//! wait still kills its child and releases its registry entry.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExitStatus, ProcessHandle, ProcessRegistry, ProcessState, RunningProcess, KILL_SIGNAL};
use crate::args::{ArgumentVector, StdinSource};

/// Default time a process gets to exit after the graceful signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default time to wait for the kernel to reap a force-killed process.
pub const DEFAULT_KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Executable not found: {program}")]
    NotFound { program: String },
    /// Permission denied when spawning.
    #[error("Permission denied: {program}")]
    PermissionDenied { program: String },
    /// Other I/O error.
    #[error("Failed to spawn {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The runtime is shutting down and accepts no new processes.
    #[error("Runtime is shutting down")]
    ShuttingDown,
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { program },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io {
                program,
                source: err,
            },
        }
    }
}

/// Why a wait stopped waiting for a natural exit.
enum Stop {
    Exited(std::process::ExitStatus),
    Timeout,
    Cancelled,
    Shutdown,
}

/// Result of the terminate → grace → kill sequence.
enum Termination {
    /// Exited within the grace period.
    Graceful(std::process::ExitStatus),
    /// Force-killed; `None` when reaping is still pending in the background.
    Killed(Option<std::process::ExitStatus>),
}

/// Spawns children and owns their lifetime.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    registry: ProcessRegistry,
    grace_period: Duration,
    kill_reap_timeout: Duration,
}

impl ProcessSupervisor {
    /// Create a supervisor that records its children in `registry`.
    #[must_use]
    pub fn new(registry: ProcessRegistry) -> Self {
        Self {
            registry,
            grace_period: DEFAULT_GRACE_PERIOD,
            kill_reap_timeout: DEFAULT_KILL_REAP_TIMEOUT,
        }
    }

    /// Set the grace period between the graceful signal and the kill.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set how long to wait for a killed process to be reaped.
    #[must_use]
    pub fn with_kill_reap_timeout(mut self, timeout: Duration) -> Self {
        self.kill_reap_timeout = timeout;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    #[must_use]
    pub fn kill_reap_timeout(&self) -> Duration {
        self.kill_reap_timeout
    }

    /// Spawn the child described by `argv`.
    ///
    /// Stdout and stderr are always piped; stdin follows the vector's
    /// [`StdinSource`]. The timeout is measured from spawn.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the executable cannot be started or the
    /// registry is shutting down.
    pub fn spawn(
        &self,
        argv: &ArgumentVector,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<ProcessHandle, SpawnError> {
        if self.registry.is_closing() {
            return Err(SpawnError::ShuttingDown);
        }

        let mut cmd = Command::new(argv.program());
        cmd.args(argv.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if argv.clears_env() {
            cmd.env_clear();
        }
        cmd.envs(argv.env());

        if let Some(dir) = argv.working_dir() {
            cmd.current_dir(dir);
        }

        cmd.stdin(match argv.stdin() {
            StdinSource::Null => Stdio::null(),
            StdinSource::Inherit => Stdio::inherit(),
            StdinSource::Bytes(_) => Stdio::piped(),
        });

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(argv.program(), e))?;
        let pid = child.id().unwrap_or_default();

        let stdin_task = match (argv.stdin(), child.stdin.take()) {
            (StdinSource::Bytes(bytes), Some(stdin)) => {
                Some(tokio::spawn(feed_stdin(stdin, bytes.clone())))
            }
            _ => None,
        };

        let call_id = Uuid::new_v4();
        let started_at = Utc::now();
        // On failure `child` is dropped here and killed.
        let registration = self.registry.register(RunningProcess {
            call_id,
            pid,
            program: argv.program().to_string(),
            started_at,
        })?;

        tracing::debug!(%call_id, pid, program = %argv.program(), "Spawned process");

        Ok(ProcessHandle {
            call_id,
            pid,
            program: argv.program().to_string(),
            started_at,
            started: Instant::now(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child: Some(child),
            state: ProcessState::Running,
            exit: None,
            timeout,
            cancel,
            shutdown: self.registry.shutdown_token(),
            exited: CancellationToken::new(),
            registration: Some(registration),
            stdin_task,
        })
    }

    /// Wait until the process exits, its timeout elapses, the call is
    /// cancelled or the host shuts down.
    ///
    /// Timeout and cancellation always end in termination within the grace
    /// period plus the reap timeout. A host shutdown reports the natural
    /// status when the child exits within the grace period, and `cancelled`
    /// when it had to be killed. Calling `wait` again returns the recorded
    /// status.
    ///
    /// # Errors
    ///
    /// Returns an error if the process status cannot be queried.
    pub async fn wait(&self, handle: &mut ProcessHandle) -> io::Result<ExitStatus> {
        if let Some(status) = handle.exit {
            return Ok(status);
        }
        let Some(child) = handle.child.as_mut() else {
            return Err(io::Error::other("process handle has no child"));
        };

        // A timeout too large to represent as an instant never fires.
        let deadline = handle.timeout.and_then(|t| handle.started.checked_add(t));
        let stop = tokio::select! {
            biased;
            status = child.wait() => Stop::Exited(status?),
            () = deadline_elapsed(deadline) => Stop::Timeout,
            () = handle.cancel.cancelled() => Stop::Cancelled,
            () = handle.shutdown.cancelled() => Stop::Shutdown,
        };

        let status = match stop {
            Stop::Exited(status) => ExitStatus::from_std(status),
            Stop::Timeout => {
                tracing::info!(pid = handle.pid, timeout = ?handle.timeout, "Process timed out");
                self.terminate(handle).await?.status().with_timed_out()
            }
            Stop::Cancelled => {
                tracing::info!(pid = handle.pid, "Call cancelled, terminating process");
                self.terminate(handle).await?.status().with_cancelled()
            }
            Stop::Shutdown => {
                tracing::info!(pid = handle.pid, "Host shutting down, terminating process");
                match self.terminate(handle).await? {
                    Termination::Graceful(status) => ExitStatus::from_std(status),
                    killed @ Termination::Killed(_) => killed.status().with_cancelled(),
                }
            }
        };

        tracing::debug!(
            pid = handle.pid,
            code = status.code,
            signal = ?status.signal,
            timed_out = status.timed_out,
            cancelled = status.cancelled,
            elapsed_ms = u64::try_from(handle.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Process exited"
        );
        handle.finish(status);
        Ok(status)
    }

    /// Graceful signal, grace period, then kill.
    async fn terminate(&self, handle: &mut ProcessHandle) -> io::Result<Termination> {
        let pid = handle.pid;
        let Some(child) = handle.child.as_mut() else {
            return Err(io::Error::other("process handle has no child"));
        };

        send_terminate(child);
        let graceful = tokio::time::timeout(self.grace_period, child.wait()).await;
        if let Ok(status) = graceful {
            return Ok(Termination::Graceful(status?));
        }

        tracing::warn!(pid, grace = ?self.grace_period, "Process ignored graceful termination, killing");
        if let Err(e) = child.start_kill() {
            tracing::debug!(pid, error = %e, "Kill signal not delivered");
        }

        let reaped = tokio::time::timeout(self.kill_reap_timeout, child.wait()).await;
        if let Ok(status) = reaped {
            return Ok(Termination::Killed(Some(status?)));
        }

        tracing::warn!(pid, "Killed process not reaped in time, reaping in background");
        if let Some(mut child) = handle.child.take() {
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    tracing::warn!(pid, error = %e, "Background reap failed");
                }
            });
        }
        Ok(Termination::Killed(None))
    }
}

impl Termination {
    fn status(&self) -> ExitStatus {
        match self {
            Self::Graceful(status) | Self::Killed(Some(status)) => ExitStatus::from_std(*status),
            Self::Killed(None) => ExitStatus::from_signal(KILL_SIGNAL),
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn feed_stdin(mut stdin: ChildStdin, bytes: Vec<u8>) {
    if let Err(e) = stdin.write_all(&bytes).await {
        tracing::debug!(error = %e, "Child closed stdin before input was written");
    }
}

/// Ask the child to exit.
///
/// On Unix, sends SIGTERM. On other platforms, falls back to immediate kill.
fn send_terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "SIGTERM not delivered");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            tracing::debug!(error = %e, "Kill signal not delivered");
        }
    }
}
