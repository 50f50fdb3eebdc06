//! Tests for exit status classification.

use std::time::Duration;

use cli_bridge::outcome::{translate, ExitMatch, TranslationRule, TranslationRules};
use cli_bridge::pattern::Pattern;
use cli_bridge::process::ExitStatus;
use cli_bridge::{BridgeError, ErrorKind};

const TIMEOUT: Duration = Duration::from_secs(1);

fn git_rules() -> TranslationRules {
    TranslationRules::new()
        .rule(
            TranslationRule::new("NotARepository")
                .exit(ExitMatch::Codes(vec![128]))
                .stderr(Pattern::new(r"not a git repository").unwrap()),
        )
        .rule(
            TranslationRule::new("UnknownRevision")
                .exit(ExitMatch::Codes(vec![128]))
                .stderr(Pattern::new(r"unknown revision (?P<detail>\S+)").unwrap()),
        )
        .rule(TranslationRule::exit_codes("NotFound", &[2]))
}

#[test]
fn scenario_b_exit_code_rule() {
    let err = translate(&ExitStatus::from_code(2), "", &git_rules(), TIMEOUT).unwrap_err();
    assert_eq!(err.failure_kind().map(|k| k.as_str()), Some("NotFound"));
    assert_ne!(err.kind(), ErrorKind::ProcessFailed);
}

#[test]
fn stderr_patterns_disambiguate_same_code() {
    let rules = git_rules();
    let err = translate(
        &ExitStatus::from_code(128),
        "fatal: not a git repository (or any parent)",
        &rules,
        TIMEOUT,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "NotARepository");

    let err = translate(
        &ExitStatus::from_code(128),
        "fatal: unknown revision deadbeef",
        &rules,
        TIMEOUT,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "UnknownRevision: deadbeef");
}

#[test]
fn unmatched_failure_is_generic() {
    let err = translate(&ExitStatus::from_code(128), "fatal: other", &git_rules(), TIMEOUT)
        .unwrap_err();
    match err {
        BridgeError::ProcessFailed { code, stderr, .. } => {
            assert_eq!(code, 128);
            assert_eq!(stderr, "fatal: other");
        }
        other => panic!("Expected ProcessFailed, got {other:?}"),
    }
}

#[test]
fn flags_take_precedence_over_every_rule() {
    let mut rules = git_rules();
    rules = rules.rule(TranslationRule::new("Everything").exit(ExitMatch::Any));

    for code in [0, 1, 2, 128, -1] {
        for stderr in ["", "not a git repository", "unknown revision x"] {
            let status = ExitStatus::from_code(code);
            let err = translate(&status.with_timed_out(), stderr, &rules, TIMEOUT).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Timeout, "code {code} stderr {stderr:?}");

            let err = translate(&status.with_cancelled(), stderr, &rules, TIMEOUT).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Cancelled, "code {code} stderr {stderr:?}");
        }
    }
}

#[test]
fn clean_exit_without_rules_succeeds() {
    assert!(translate(&ExitStatus::from_code(0), "warning: x", &git_rules(), TIMEOUT).is_ok());
}
