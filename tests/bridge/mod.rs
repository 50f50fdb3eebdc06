//! Bridge call tests.

#[cfg(unix)]
mod call_test;

use cli_bridge::config::RuntimeConfig;
use cli_bridge::Bridge;

/// Bridge with short grace periods so termination tests stay fast.
pub fn bridge() -> Bridge {
    Bridge::new(RuntimeConfig {
        grace_period_ms: 200,
        kill_reap_timeout_ms: 1000,
        drain_linger_ms: 100,
        ..RuntimeConfig::default()
    })
}
