//! Error taxonomy for bridge calls.

use std::time::Duration;

use serde::Serialize;

use crate::args::RequestError;
use crate::outcome::FailureKind;
use crate::process::SpawnError;

/// Errors a bridge call can surface to its caller.
///
/// The runtime never retries; whether any of these is worth retrying is a
/// property of the wrapped tool, not of the bridge.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// The request failed validation before anything was spawned.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The executable could not be started.
    #[error("Spawn failed: {0}")]
    SpawnFailed(#[from] SpawnError),

    /// The call's deadline elapsed before the process exited.
    #[error("Timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was enforced.
        timeout: Duration,
    },

    /// The caller cancelled the call, or the host shut down and the process
    /// had to be force-killed.
    #[error("Call cancelled")]
    Cancelled,

    /// The process succeeded but its output did not parse.
    #[error("Malformed output: {reason}")]
    MalformedOutput {
        /// Why parsing failed.
        reason: String,
        /// Raw captured stdout.
        stdout: String,
    },

    /// Nonzero exit that no translation rule classified.
    #[error("Process failed with exit code {code}{}", signal_suffix(*signal))]
    ProcessFailed {
        /// Exit code (`SIGNAL_EXIT_CODE` when killed by a signal).
        code: i32,
        /// Terminating signal, if any.
        signal: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// A translation rule classified the failure.
    #[error("{kind}{}", detail_suffix(detail.as_deref()))]
    ToolFailed {
        /// Failure kind named by the matching rule.
        kind: FailureKind,
        /// Detail extracted from stderr, if the rule captures one.
        detail: Option<String>,
        /// Exit code of the process.
        code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// I/O error while supervising the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn signal_suffix(signal: Option<i32>) -> String {
    signal.map(|s| format!(" (signal {s})")).unwrap_or_default()
}

fn detail_suffix(detail: Option<&str>) -> String {
    detail.map(|d| format!(": {d}")).unwrap_or_default()
}

/// Flat classification of a [`BridgeError`], for transports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    SpawnFailed,
    Timeout,
    Cancelled,
    MalformedOutput,
    ProcessFailed,
    ToolFailed,
    Io,
}

impl BridgeError {
    /// Get the flat kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::SpawnFailed(_) => ErrorKind::SpawnFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            Self::ProcessFailed { .. } => ErrorKind::ProcessFailed,
            Self::ToolFailed { .. } => ErrorKind::ToolFailed,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns the failure kind if a translation rule classified this error.
    #[must_use]
    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            Self::ToolFailed { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Returns captured stderr for process-level failures.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { stderr, .. } | Self::ToolFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
