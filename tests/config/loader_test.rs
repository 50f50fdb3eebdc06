//! Tests for loading operations from TOML and running them.

use std::io::Write;

use serde::Deserialize;
use serde_json::json;

use cli_bridge::args::request_from;
use cli_bridge::config::{ConfigError, ConfigLoader};
use cli_bridge::{Bridge, CallOptions};

const CATALOGUE: &str = r#"
[runtime]
grace_period_ms = 100
default_timeout_ms = 10000

[operations.wc.command]
program = "wc"
args = [
    { render = { kind = "literal", value = "-c" } },
    { field = "path", render = { kind = "positional" }, required = true, constraints = [{ kind = "no_leading_dash" }] },
]
output = { mode = "batch", parse = { format = "pattern", required = ["bytes"], rules = [{ pattern = '^\s*(?P<bytes>\d+)', coerce = { bytes = "integer" } }] } }

[[operations.wc.rules]]
stderr = 'No such file'
kind = "NotFound"
"#;

#[derive(Debug, Deserialize)]
struct Count {
    bytes: u64,
}

fn load() -> cli_bridge::config::BridgeConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CATALOGUE.as_bytes()).unwrap();
    ConfigLoader::with_path(file.path().to_path_buf())
        .load()
        .unwrap()
}

#[tokio::test]
async fn configured_operation_runs() {
    let config = load();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");
    std::fs::write(&path, "12345").unwrap();

    let bridge = Bridge::new(config.runtime.clone());
    let op = config.operation("wc").unwrap();
    let request = request_from(&json!({"path": path})).unwrap();
    let count: Count = bridge.call(op, &request, CallOptions::new()).await.unwrap();
    assert_eq!(count.bytes, 5);
}

#[tokio::test]
async fn configured_rule_classifies_failure() {
    let config = load();
    let bridge = Bridge::new(config.runtime.clone());
    let op = config.operation("wc").unwrap();
    let request = request_from(&json!({"path": "/nonexistent/data.txt"})).unwrap();
    let err = bridge
        .call::<Count>(op, &request, CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.failure_kind().map(|k| k.as_str()), Some("NotFound"));
}

#[test]
fn configured_constraint_rejects_flag_injection() {
    let config = load();
    let bridge = Bridge::new(config.runtime.clone());
    let request = request_from(&json!({"path": "--files0-from=/etc/passwd"})).unwrap();
    let err = bridge
        .render(config.operation("wc").unwrap(), &request)
        .unwrap_err();
    assert_eq!(err.kind(), cli_bridge::ErrorKind::InvalidRequest);
}

#[test]
fn unreadable_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::with_path(dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn named_file_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let err = ConfigLoader::with_path(missing.clone()).load().unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(ref path) if *path == missing));
    assert!(err.to_string().contains("absent.toml"));
}
