//! Event stream returned by streaming calls.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;
use uuid::Uuid;

use crate::error::BridgeError;
use crate::output::OutputEvent;
use crate::process::ExitStatus;

/// Final report of a successful streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    /// Events produced, malformed ones included.
    pub events: u64,
    /// Events that failed to parse.
    pub malformed: u64,
    pub exit: ExitStatus,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

pub(super) type OutcomeReceiver = oneshot::Receiver<Result<StreamSummary, BridgeError>>;

/// Lazy, single-pass sequence of events from a running process.
///
/// The stream ends when the process's stdout closes. The terminal outcome
/// comes from [`BridgeStream::outcome`] once the events have been read.
/// Dropping the stream before that cancels the call and terminates the
/// process.
#[derive(Debug)]
pub struct BridgeStream<T> {
    call_id: Uuid,
    events: ReceiverStream<OutputEvent<T>>,
    outcome: OutcomeReceiver,
    guard: Option<DropGuard>,
}

impl<T> BridgeStream<T> {
    pub(super) fn new(
        call_id: Uuid,
        events: ReceiverStream<OutputEvent<T>>,
        outcome: OutcomeReceiver,
        guard: DropGuard,
    ) -> Self {
        Self {
            call_id,
            events,
            outcome,
            guard: Some(guard),
        }
    }

    #[must_use]
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Wait for the terminal outcome.
    ///
    /// Events not yet read are discarded. The process is left to finish on
    /// its own, bounded by the call's timeout.
    ///
    /// # Errors
    ///
    /// Returns the call's failure, translated from the exit status.
    pub async fn outcome(self) -> Result<StreamSummary, BridgeError> {
        let Self {
            events,
            outcome,
            guard,
            ..
        } = self;
        if let Some(guard) = guard {
            guard.disarm();
        }
        drop(events);

        outcome.await.unwrap_or_else(|_| {
            Err(BridgeError::Io(io::Error::other(
                "call supervision ended without an outcome",
            )))
        })
    }
}

impl<T> Unpin for BridgeStream<T> {}

impl<T> Stream for BridgeStream<T> {
    type Item = OutputEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}
