//! Bridge call orchestration.

use std::io;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{BridgeStream, CallState, CallStateMachine, StreamSummary};
use crate::args::{build, ArgumentVector, Request};
use crate::config::{Operation, RuntimeConfig};
use crate::error::BridgeError;
use crate::outcome::translate;
use crate::output::{parse_batch, produce, OutputMode};
use crate::process::{capture, ProcessHandle, ProcessRegistry, ProcessSupervisor};

/// Per-call inputs besides the request.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the operation's timeout.
    pub timeout: Option<Duration>,
    /// Cancelling this token terminates the call's process.
    pub cancel: CancellationToken,
}

impl CallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of [`Bridge::invoke`], shaped by the operation's output mode.
#[derive(Debug)]
pub enum Outcome<T> {
    Value(T),
    Stream(BridgeStream<T>),
}

/// Runs operations as child processes.
///
/// A bridge owns the registry of its running children. Clones share it.
#[derive(Debug, Clone)]
pub struct Bridge {
    supervisor: ProcessSupervisor,
    config: RuntimeConfig,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Bridge {
    /// Create a bridge with a fresh, open registry.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let supervisor = ProcessSupervisor::new(ProcessRegistry::new())
            .with_grace_period(config.grace_period())
            .with_kill_reap_timeout(config.kill_reap_timeout());
        Self { supervisor, config }
    }

    #[must_use]
    pub fn registry(&self) -> &ProcessRegistry {
        self.supervisor.registry()
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Render the invocation without running it.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidRequest` if the request does not fit the
    /// operation's templates.
    pub fn render(
        &self,
        operation: &Operation,
        request: &Request,
    ) -> Result<ArgumentVector, BridgeError> {
        Ok(build(request, operation.command_spec())?)
    }

    fn resolve_timeout(&self, operation: &Operation, options: &CallOptions) -> Option<Duration> {
        options
            .timeout
            .or_else(|| operation.configured_timeout())
            .or_else(|| self.config.default_timeout())
    }

    /// Build, spawn and supervise one process.
    fn start(
        &self,
        machine: &mut CallStateMachine,
        operation: &Operation,
        request: &Request,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<ProcessHandle, BridgeError> {
        let argv = self.render(operation, request).inspect_err(|e| {
            tracing::debug!(error = %e, "Request rejected");
            machine.abandon();
        })?;
        if cancel.is_cancelled() {
            machine.interrupt();
            return Err(BridgeError::Cancelled);
        }

        let handle = self
            .supervisor
            .spawn(&argv, timeout, cancel)
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Spawn failed");
                machine.abandon();
            })?;
        machine.transition(CallState::Spawned);
        tracing::Span::current().record("call_id", tracing::field::display(handle.call_id()));
        Ok(handle)
    }

    /// Run an operation to completion and parse its whole output.
    ///
    /// Stdout and stderr are drained while the process runs; the exit
    /// status is translated first, and output is parsed only on success.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` for every failure in the taxonomy.
    pub async fn call<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        request: &Request,
        options: CallOptions,
    ) -> Result<T, BridgeError> {
        let span = tracing::info_span!(
            "call",
            program = %operation.command_spec().program(),
            call_id = tracing::field::Empty,
        );
        self.run_batch(operation, request, options)
            .instrument(span)
            .await
    }

    async fn run_batch<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        request: &Request,
        options: CallOptions,
    ) -> Result<T, BridgeError> {
        let mut machine = CallStateMachine::new();
        let timeout = self.resolve_timeout(operation, &options);
        let mut handle = self.start(&mut machine, operation, request, timeout, options.cancel)?;

        let stdout = handle.take_stdout();
        let stderr = handle.take_stderr();
        let exited = handle.exited_token();
        let limits = self.config.capture_limits();
        machine.transition(CallState::Running);
        machine.transition(CallState::Draining);

        let (status, out, err) = tokio::join!(
            self.supervisor.wait(&mut handle),
            capture(stdout, limits, exited.clone()),
            capture(stderr, limits, exited),
        );
        let status = status.inspect_err(|_| machine.abandon())?;
        if status.timed_out || status.cancelled {
            machine.interrupt();
        } else {
            machine.transition(CallState::Exited);
        }
        let out = out.inspect_err(|_| machine.abandon())?;
        let err = err.inspect_err(|_| machine.abandon())?;
        if out.truncated || err.truncated {
            tracing::warn!(
                stdout_truncated = out.truncated,
                stderr_truncated = err.truncated,
                limit = limits.max_bytes,
                "Output exceeded capture limit"
            );
        }

        let stderr = err.text();
        let verdict = translate(
            &status,
            &stderr,
            operation.translation_rules(),
            timeout.unwrap_or_default(),
        );
        machine.transition(CallState::Translated);
        let result = verdict.and_then(|()| {
            let stdout = out.text();
            if out.truncated {
                return Err(BridgeError::MalformedOutput {
                    reason: format!("stdout exceeded {} bytes", limits.max_bytes),
                    stdout,
                });
            }
            parse_batch(&operation.command_spec().output_spec().parse, &stdout)
        });
        machine.transition(CallState::Done);
        if let Err(e) = &result {
            tracing::debug!(error = %e, kind = ?e.kind(), "Call failed");
        }
        result
    }

    /// Start an operation and stream one event per line of its stdout.
    ///
    /// Events are buffered up to the configured stream buffer; beyond that
    /// the drain waits on the consumer. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `SpawnFailed` or `Cancelled` before anything
    /// is streamed. Later failures arrive through [`BridgeStream::outcome`].
    pub fn stream<T>(
        &self,
        operation: &Operation,
        request: &Request,
        options: CallOptions,
    ) -> Result<BridgeStream<T>, BridgeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let span = tracing::info_span!(
            "call",
            program = %operation.command_spec().program(),
            call_id = tracing::field::Empty,
        );
        let _entered = span.enter();

        let mut machine = CallStateMachine::new();
        let timeout = self.resolve_timeout(operation, &options);
        let cancel = options.cancel.child_token();
        let guard = cancel.clone().drop_guard();
        let mut handle = self.start(&mut machine, operation, request, timeout, cancel)?;
        let call_id = handle.call_id();

        let stdout = handle.take_stdout();
        let stderr = handle.take_stderr();
        let exited = handle.exited_token();
        let limits = self.config.capture_limits();
        let strategy = operation.command_spec().output_spec().parse.clone();

        let (tx, rx) = mpsc::channel(self.config.stream_buffer());
        let producer = tokio::spawn(
            produce::<T, _>(stdout, strategy, tx, limits, exited.clone())
                .instrument(tracing::Span::current()),
        );
        machine.transition(CallState::Running);
        machine.transition(CallState::Streaming);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let supervisor = self.supervisor.clone();
        let rules = operation.translation_rules().clone();
        tokio::spawn(
            async move {
                let (status, err) = tokio::join!(
                    supervisor.wait(&mut handle),
                    capture(stderr, limits, exited),
                );
                let result = async {
                    let status = status?;
                    if status.timed_out || status.cancelled {
                        machine.interrupt();
                    } else {
                        machine.transition(CallState::Exited);
                    }
                    let counts = producer
                        .await
                        .map_err(|e| io::Error::other(format!("stream producer failed: {e}")))??;
                    let stderr = err?.text();

                    translate(&status, &stderr, &rules, timeout.unwrap_or_default())?;
                    Ok::<_, BridgeError>(StreamSummary {
                        events: counts.events,
                        malformed: counts.malformed,
                        exit: status,
                        elapsed: handle.elapsed(),
                    })
                }
                .await;

                if machine.state() == CallState::Exited {
                    machine.transition(CallState::Translated);
                    machine.transition(CallState::Done);
                } else {
                    machine.abandon();
                }
                if let Err(e) = &result {
                    tracing::debug!(error = %e, kind = ?e.kind(), "Streaming call failed");
                }
                if outcome_tx.send(result).is_err() {
                    tracing::debug!("Stream outcome dropped by caller");
                }
            }
            .instrument(tracing::Span::current()),
        );

        Ok(BridgeStream::new(
            call_id,
            ReceiverStream::new(rx),
            outcome_rx,
            guard,
        ))
    }

    /// Run an operation in the mode its operation configures.
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::call`] and [`Bridge::stream`].
    pub async fn invoke<T>(
        &self,
        operation: &Operation,
        request: &Request,
        options: CallOptions,
    ) -> Result<Outcome<T>, BridgeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match operation.command_spec().output_spec().mode {
            OutputMode::Batch => self.call(operation, request, options).await.map(Outcome::Value),
            OutputMode::Streaming => self.stream(operation, request, options).map(Outcome::Stream),
        }
    }

    /// Terminate every running call and wait for the registry to drain.
    ///
    /// New calls fail with `SpawnFailed` from here on. Returns true when
    /// every child was reaped in time.
    pub async fn shutdown(&self) -> bool {
        let wait = self.config.grace_period()
            + self.config.kill_reap_timeout()
            + self.config.drain_linger();
        self.registry().shutdown(wait).await
    }
}
