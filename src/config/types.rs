//! Configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::args::CommandSpec;
use crate::outcome::TranslationRules;
use crate::output::DEFAULT_STREAM_BUFFER;
use crate::process::{
    CaptureLimits, DEFAULT_DRAIN_LINGER, DEFAULT_GRACE_PERIOD, DEFAULT_KILL_REAP_TIMEOUT,
    DEFAULT_MAX_OUTPUT_BYTES,
};

/// Runtime tunables shared by every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Time between the graceful signal and the kill.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Time to wait for a killed process to be reaped.
    #[serde(default = "default_kill_reap_timeout_ms")]
    pub kill_reap_timeout_ms: u64,
    /// Time output drains keep reading after the process exited.
    #[serde(default = "default_drain_linger_ms")]
    pub drain_linger_ms: u64,
    /// Timeout for operations that set none.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    /// Events buffered ahead of a slow stream consumer.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Bytes kept per output stream.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_grace_period_ms() -> u64 {
    duration_ms(DEFAULT_GRACE_PERIOD)
}

fn default_kill_reap_timeout_ms() -> u64 {
    duration_ms(DEFAULT_KILL_REAP_TIMEOUT)
}

fn default_drain_linger_ms() -> u64 {
    duration_ms(DEFAULT_DRAIN_LINGER)
}

fn default_stream_buffer() -> usize {
    DEFAULT_STREAM_BUFFER
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            kill_reap_timeout_ms: default_kill_reap_timeout_ms(),
            drain_linger_ms: default_drain_linger_ms(),
            default_timeout_ms: None,
            stream_buffer: default_stream_buffer(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    #[must_use]
    pub fn kill_reap_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_reap_timeout_ms)
    }

    #[must_use]
    pub fn drain_linger(&self) -> Duration {
        Duration::from_millis(self.drain_linger_ms)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Stream buffer size, never zero.
    #[must_use]
    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer.max(1)
    }

    #[must_use]
    pub fn capture_limits(&self) -> CaptureLimits {
        CaptureLimits {
            max_bytes: self.max_output_bytes,
            linger: self.drain_linger(),
        }
    }
}

/// One wrapped tool operation: how to invoke it and how to read its failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub command: CommandSpec,
    #[serde(default)]
    pub rules: TranslationRules,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Operation {
    #[must_use]
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            rules: TranslationRules::new(),
            timeout_ms: None,
        }
    }

    #[must_use]
    pub fn rules(mut self, rules: TranslationRules) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(duration_ms(timeout));
        self
    }

    #[must_use]
    pub fn command_spec(&self) -> &CommandSpec {
        &self.command
    }

    #[must_use]
    pub fn translation_rules(&self) -> &TranslationRules {
        &self.rules
    }

    #[must_use]
    pub fn configured_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub operations: BTreeMap<String, Operation>,
}

impl BridgeConfig {
    /// Look up an operation by name.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }
}
