//! Termination status of a supervised process.

use serde::{Deserialize, Serialize};

/// Exit code reported when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Signal number recorded when a child had to be force-killed and could not
/// be reaped to observe its real status.
pub const KILL_SIGNAL: i32 = 9;

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code, or [`SIGNAL_EXIT_CODE`] when killed by a signal.
    pub code: i32,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// The supervisor terminated the process because its timeout elapsed.
    pub timed_out: bool,
    /// The process was terminated because the call was cancelled.
    pub cancelled: bool,
}

impl ExitStatus {
    /// A natural exit with the given code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self {
            code,
            signal: None,
            timed_out: false,
            cancelled: false,
        }
    }

    /// Termination by a signal.
    #[must_use]
    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: SIGNAL_EXIT_CODE,
            signal: Some(signal),
            timed_out: false,
            cancelled: false,
        }
    }

    /// Convert an OS exit status.
    #[must_use]
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::from_code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::from_signal(signal);
            }
        }

        Self {
            code: SIGNAL_EXIT_CODE,
            signal: None,
            timed_out: false,
            cancelled: false,
        }
    }

    /// Mark the status as timeout-triggered.
    #[must_use]
    pub fn with_timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }

    /// Mark the status as cancellation-triggered.
    #[must_use]
    pub fn with_cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    /// Returns true for a natural exit with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0 && !self.timed_out && !self.cancelled
    }
}
