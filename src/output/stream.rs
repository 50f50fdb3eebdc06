//! Streaming interpretation: one event per line of stdout.

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use super::{decode, ParseStrategy};
use crate::process::CaptureLimits;

/// Default number of parsed events buffered ahead of the consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Parsed payload of one output unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload<T> {
    Parsed(T),
    /// The unit failed to parse. The stream continues.
    Malformed { raw: String, reason: String },
}

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEvent<T> {
    /// Arrival order, starting at 0 with no gaps.
    pub seq: u64,
    pub payload: EventPayload<T>,
}

impl<T> OutputEvent<T> {
    /// Returns the parsed value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match &self.payload {
            EventPayload::Parsed(value) => Some(value),
            EventPayload::Malformed { .. } => None,
        }
    }

    /// Consume the event, returning the parsed value.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self.payload {
            EventPayload::Parsed(value) => Some(value),
            EventPayload::Malformed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self.payload, EventPayload::Malformed { .. })
    }
}

/// Totals reported by the producer once stdout closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub events: u64,
    pub malformed: u64,
}

/// Read stdout line by line, sending one event per non-blank line.
///
/// Sends wait on the bounded channel, so a slow consumer pushes back on the
/// drain and, through the pipe, on the child. If the consumer goes away the
/// rest of stdout is still drained, counted and discarded so the child
/// never blocks on a full pipe. A line longer than the output limit is
/// never held in full: its head is kept, the rest skipped, and it surfaces
/// as one malformed event.
///
/// # Errors
///
/// Returns an error if reading from the pipe fails.
pub async fn produce<T, R>(
    reader: Option<R>,
    strategy: ParseStrategy,
    tx: Sender<OutputEvent<T>>,
    limits: CaptureLimits,
    exited: CancellationToken,
) -> io::Result<StreamCounts>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut counts = StreamCounts::default();
    let Some(reader) = reader else {
        return Ok(counts);
    };

    let give_up = async {
        exited.cancelled().await;
        tokio::time::sleep(limits.linger).await;
    };
    tokio::pin!(give_up);

    let mut reader = BufReader::new(reader);
    // Room for the longest accepted line plus its line ending.
    let keep = limits.max_bytes.saturating_add(2);
    let mut buf = Vec::new();
    let mut consumer_gone = false;

    loop {
        buf.clear();
        let line = tokio::select! {
            read = read_line_bounded(&mut reader, &mut buf, keep) => read?,
            () = &mut give_up => {
                tracing::warn!(events = counts.events, "Stdout still open after process exit, ending stream");
                break;
            }
        };
        if line.len == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&buf);
        let unit = text.trim_end_matches(['\n', '\r']);
        if !line.overflowed && unit.trim().is_empty() {
            continue;
        }

        let payload = if line.overflowed || unit.len() > limits.max_bytes {
            EventPayload::Malformed {
                raw: String::new(),
                reason: format!("line of {} bytes exceeds limit", line.len),
            }
        } else {
            match strategy
                .parse_unit(unit)
                .and_then(|value| decode::<T>(value).map_err(|e| e.to_string()))
            {
                Ok(value) => EventPayload::Parsed(value),
                Err(reason) => EventPayload::Malformed {
                    raw: unit.to_string(),
                    reason,
                },
            }
        };
        if matches!(payload, EventPayload::Malformed { .. }) {
            counts.malformed += 1;
            tracing::debug!(seq = counts.events, "Malformed output line");
        }

        let event = OutputEvent {
            seq: counts.events,
            payload,
        };
        counts.events += 1;

        if consumer_gone {
            continue;
        }
        if tx.send(event).await.is_err() {
            tracing::debug!("Stream consumer dropped, discarding remaining output");
            consumer_gone = true;
        }
    }

    Ok(counts)
}

/// One line as read by [`read_line_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineRead {
    /// Bytes consumed from the reader, line ending included.
    len: usize,
    /// The line did not fit and only its head was kept.
    overflowed: bool,
}

/// Read up to and including the next `\n`, keeping at most `keep` bytes in
/// `buf`. The rest of an overlong line is consumed and dropped.
async fn read_line_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    keep: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = LineRead {
        len: 0,
        overflowed: false,
    };
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(line);
        }
        let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let room = keep.saturating_sub(buf.len());
        if chunk.len() > room {
            line.overflowed = true;
        }
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        let used = chunk.len();
        reader.consume(used);
        line.len += used;
        if complete {
            return Ok(line);
        }
    }
}
