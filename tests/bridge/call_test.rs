//! Tests for request/response calls.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio_test::assert_err;
use tokio_util::sync::CancellationToken;

use cli_bridge::args::{request_from, ArgTemplate, CommandSpec, Request};
use cli_bridge::config::{Operation, RuntimeConfig};
use cli_bridge::outcome::{TranslationRule, TranslationRules};
use cli_bridge::output::{OutputSpec, ParseStrategy};
use cli_bridge::pattern::Pattern;
use cli_bridge::process::SpawnError;
use cli_bridge::{Bridge, BridgeError, CallOptions, ErrorKind};

use super::bridge;
use crate::{sh, IGNORE_TERM};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Listing {
    #[serde(default)]
    entries: Vec<String>,
}

fn shell(script: &str) -> Operation {
    Operation::new(sh(script))
}

#[tokio::test]
async fn scenario_a_empty_output_is_default_result() {
    let op = Operation::new(CommandSpec::new("true").arg(ArgTemplate::positional("path")));
    let request = request_from(&json!({"path": "a.txt"})).unwrap();
    let bridge = bridge();

    assert_eq!(bridge.render(&op, &request).unwrap().args(), ["a.txt"]);
    let listing: Listing = bridge.call(&op, &request, CallOptions::new()).await.unwrap();
    assert_eq!(listing, Listing::default());
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn scenario_b_exit_code_maps_to_kind() {
    let op = shell("echo 'missing' >&2; exit 2")
        .rules(TranslationRules::new().rule(TranslationRule::exit_codes("NotFound", &[2])));
    let err = bridge()
        .call::<Listing>(&op, &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    match err {
        BridgeError::ToolFailed {
            kind, code, stderr, ..
        } => {
            assert_eq!(kind.as_str(), "NotFound");
            assert_eq!(code, 2);
            assert_eq!(stderr, "missing\n");
        }
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_c_timeout() {
    let op = shell("exec sleep 30");
    let start = Instant::now();
    let err = bridge()
        .call::<Listing>(
            &op,
            &Request::new(),
            CallOptions::new().timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { timeout } if timeout == Duration::from_millis(50)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn operation_timeout_applies() {
    let op = shell(IGNORE_TERM).timeout(Duration::from_millis(300));
    let start = Instant::now();
    let err = bridge()
        .call::<Listing>(&op, &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    // Deadline, grace period, kill.
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn caller_cancellation() {
    let op = shell("exec sleep 30");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let err = bridge()
        .call::<Listing>(&op, &Request::new(), CallOptions::new().cancel(cancel))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn unmatched_failure_carries_code_and_stderr() {
    let err = bridge()
        .call::<Listing>(&shell("echo boom >&2; exit 7"), &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    match err {
        BridgeError::ProcessFailed {
            code,
            signal,
            stderr,
        } => {
            assert_eq!(code, 7);
            assert_eq!(signal, None);
            assert_eq!(stderr, "boom\n");
        }
        other => panic!("Expected ProcessFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn stderr_rule_with_detail() {
    let op = shell("echo \"error: cannot open 'db.sqlite'\" >&2; exit 1").rules(
        TranslationRules::new().rule(
            TranslationRule::new("PermissionDenied")
                .stderr(Pattern::new(r"cannot open '(?P<file>[^']+)'").unwrap())
                .detail_group("file"),
        ),
    );
    let err = bridge()
        .call::<Listing>(&op, &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "PermissionDenied: db.sqlite");
}

#[tokio::test]
async fn malformed_output_keeps_raw_stdout() {
    let err = bridge()
        .call::<Listing>(&shell("echo not-json"), &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    match err {
        BridgeError::MalformedOutput { stdout, .. } => assert_eq!(stdout, "not-json\n"),
        other => panic!("Expected MalformedOutput, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_stdout_is_malformed_not_truncated() {
    let bridge = Bridge::new(RuntimeConfig {
        max_output_bytes: 4,
        ..RuntimeConfig::default()
    });
    let op = Operation::new(
        CommandSpec::new("echo")
            .arg(ArgTemplate::literal("hello-world"))
            .output(OutputSpec::batch(ParseStrategy::Text)),
    );
    let err = bridge
        .call::<String>(&op, &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    match err {
        BridgeError::MalformedOutput { reason, stdout } => {
            assert_eq!(reason, "stdout exceeded 4 bytes");
            assert_eq!(stdout, "hell");
        }
        other => panic!("Expected MalformedOutput, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_stdout_of_failed_call_reports_the_failure() {
    let bridge = Bridge::new(RuntimeConfig {
        max_output_bytes: 4,
        ..RuntimeConfig::default()
    });
    let err = bridge
        .call::<String>(&shell("echo hello-world; exit 3"), &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessFailed);
}

#[tokio::test]
async fn unbounded_timeout_means_no_deadline() {
    let op = Operation::new(CommandSpec::new("true"));
    let listing: Listing = bridge()
        .call(&op, &Request::new(), CallOptions::new().timeout(Duration::MAX))
        .await
        .unwrap();
    assert_eq!(listing, Listing::default());
}

#[tokio::test]
async fn structured_output_into_type() {
    let op = Operation::new(
        sh("printf '{\"entries\": [\"%s\", \"%s\"]}' \"$1\" \"$2\"")
            .arg(ArgTemplate::positional("names")),
    );
    let request = request_from(&json!({"names": ["a b", "c;d"]})).unwrap();
    let listing: Listing = bridge().call(&op, &request, CallOptions::new()).await.unwrap();
    assert_eq!(listing.entries, vec!["a b", "c;d"]);
}

#[tokio::test]
async fn missing_executable_is_spawn_failed() {
    let op = Operation::new(CommandSpec::new("/nonexistent/bin/tool"));
    let err = bridge()
        .call::<Listing>(&op, &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::SpawnFailed(SpawnError::NotFound { .. })
    ));
}

#[tokio::test]
async fn invalid_request_spawns_nothing() {
    let op = Operation::new(CommandSpec::new("true").arg(ArgTemplate::positional("path").required()));
    let bridge = bridge();
    let err = assert_err!(
        bridge
            .call::<Listing>(&op, &Request::new(), CallOptions::new())
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let op = Operation::new(
        sh("sleep 0.1; echo \"$1\"")
            .arg(ArgTemplate::positional("word"))
            .output(OutputSpec::batch(ParseStrategy::Text)),
    );
    let bridge = bridge();
    let calls = (0..8).map(|i| {
        let bridge = bridge.clone();
        let op = op.clone();
        tokio::spawn(async move {
            let request = request_from(&json!({"word": format!("call-{i}")})).unwrap();
            bridge.call::<String>(&op, &request, CallOptions::new()).await
        })
    });
    let start = Instant::now();
    let results = futures_util::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().unwrap(), format!("call-{i}"));
    }
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn scenario_e_host_shutdown() {
    let bridge = bridge();
    let graceful = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .call::<Listing>(&shell("exec sleep 30"), &Request::new(), CallOptions::new())
                .await
        })
    };
    let stubborn = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .call::<Listing>(&shell(IGNORE_TERM), &Request::new(), CallOptions::new())
                .await
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.registry().len() < 2 {
        assert!(Instant::now() < deadline, "calls never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the stubborn shell install its trap.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(bridge.shutdown().await);

    let graceful = graceful.await.unwrap().unwrap_err();
    assert!(
        matches!(graceful, BridgeError::ProcessFailed { signal: Some(15), .. }),
        "graceful exit keeps its natural outcome, got {graceful:?}"
    );
    let stubborn = stubborn.await.unwrap().unwrap_err();
    assert_eq!(stubborn.kind(), ErrorKind::Cancelled);

    let err = bridge
        .call::<Listing>(&shell("exit 0"), &Request::new(), CallOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SpawnFailed(SpawnError::ShuttingDown)));
}
