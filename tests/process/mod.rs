//! Process supervisor tests.

#[cfg(unix)]
mod registry_test;

use std::time::Duration;

use cli_bridge::args::{build, ArgumentVector, Request};
use cli_bridge::process::{ProcessRegistry, ProcessSupervisor};

pub fn script(script: &str) -> ArgumentVector {
    build(&Request::new(), &crate::sh(script)).unwrap()
}

pub fn supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(ProcessRegistry::new())
        .with_grace_period(Duration::from_millis(200))
        .with_kill_reap_timeout(Duration::from_secs(1))
}
