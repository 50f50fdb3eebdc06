//! Byte sinks draining a child's output pipes.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

/// Default cap on bytes kept per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Default time a drain keeps reading after the process has exited.
pub const DEFAULT_DRAIN_LINGER: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 8192;

/// Bytes collected from one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// Collected bytes, at most the configured limit.
    pub bytes: Vec<u8>,
    /// More output was produced than the limit allowed.
    pub truncated: bool,
}

impl Captured {
    /// Lossy UTF-8 view of the captured bytes.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Bounds for draining a pipe.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Bytes kept; the rest is read and discarded so the child never blocks.
    pub max_bytes: usize,
    /// How long to keep reading once the process has exited.
    pub linger: Duration,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            linger: DEFAULT_DRAIN_LINGER,
        }
    }
}

/// Drain `reader` to EOF.
///
/// A grandchild that inherited the pipe can keep it open after the process
/// itself exited; once `exited` fires the drain gives up after
/// `limits.linger` and returns what it has.
///
/// # Errors
///
/// Returns an error if reading from the pipe fails.
pub async fn capture<R>(
    reader: Option<R>,
    limits: CaptureLimits,
    exited: CancellationToken,
) -> io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };

    let give_up = async {
        exited.cancelled().await;
        tokio::time::sleep(limits.linger).await;
    };
    tokio::pin!(give_up);

    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            () = &mut give_up => {
                tracing::warn!(
                    captured = captured.bytes.len(),
                    "Output pipe still open after process exit, abandoning drain"
                );
                break;
            }
        };
        if n == 0 {
            break;
        }

        let room = limits.max_bytes.saturating_sub(captured.bytes.len());
        if n > room && !captured.truncated {
            tracing::warn!(limit = limits.max_bytes, "Output exceeded capture limit, truncating");
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(captured)
}
