//! Process-wide registry of running children.
//!
//! The registry is the only state shared between calls. It is created with
//! the runtime, consulted when the host shuts down, and every entry is
//! removed exactly once when its [`Registration`] is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::SpawnError;

/// Snapshot of one running child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningProcess {
    /// Identifier of the call that owns the process.
    pub call_id: Uuid,
    /// OS process identifier.
    pub pid: u32,
    /// Executable name.
    pub program: String,
    /// When the process was spawned.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: Mutex<HashMap<Uuid, RunningProcess>>,
    drained: Notify,
    closing: CancellationToken,
}

/// Shared, synchronized registry of running processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

impl ProcessRegistry {
    /// Create an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, RunningProcess>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a newly spawned process.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::ShuttingDown` once [`ProcessRegistry::shutdown`]
    /// has started.
    pub fn register(&self, process: RunningProcess) -> Result<Registration, SpawnError> {
        if self.is_closing() {
            return Err(SpawnError::ShuttingDown);
        }
        let call_id = process.call_id;
        self.entries().insert(call_id, process);
        Ok(Registration {
            registry: self.clone(),
            call_id,
        })
    }

    fn remove(&self, call_id: Uuid) {
        let mut entries = self.entries();
        if entries.remove(&call_id).is_some() && entries.is_empty() {
            self.inner.drained.notify_waiters();
        }
    }

    /// Token cancelled when the host starts shutting down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.closing.clone()
    }

    /// Check if shutdown has started.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.inner.closing.is_cancelled()
    }

    /// Get the number of running processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if no process is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// List running processes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RunningProcess> {
        self.entries().values().cloned().collect()
    }

    /// Close the registry and broadcast termination to every running child.
    ///
    /// Each supervised wait reacts to the broadcast in parallel with the
    /// usual terminate → grace → kill sequence. This returns once every
    /// entry is gone, or after `wait` elapses. Returns true when the
    /// registry drained completely.
    pub async fn shutdown(&self, wait: Duration) -> bool {
        let running = self.snapshot();
        tracing::info!(running = running.len(), "Shutting down process registry");
        for process in &running {
            tracing::debug!(
                pid = process.pid,
                program = %process.program,
                call_id = %process.call_id,
                "Signalling running process"
            );
        }
        self.inner.closing.cancel();

        let drained = tokio::time::timeout(wait, self.wait_drained()).await.is_ok();
        if !drained {
            tracing::warn!(
                remaining = self.len(),
                "Registry did not drain before shutdown deadline"
            );
        }
        drained
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Proof of registration. Dropping it removes the entry.
#[derive(Debug)]
pub struct Registration {
    registry: ProcessRegistry,
    call_id: Uuid,
}

impl Registration {
    #[must_use]
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.call_id);
    }
}
