//! Tests for rendering requests into argument vectors.

use serde::Serialize;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use cli_bridge::args::{
    build, request_from, ArgTemplate, CommandSpec, Condition, Constraint, EnvTemplate,
    RequestError, StdinSource, StdinSpec, SwitchStyle,
};

fn grep_spec() -> CommandSpec {
    CommandSpec::new("grep")
        .arg(ArgTemplate::switch("ignore_case", "-i"))
        .arg(ArgTemplate::flag("max_count", "--max-count").joined())
        .arg(ArgTemplate::repeated("patterns", "-e"))
        .arg(ArgTemplate::literal("--"))
        .arg(ArgTemplate::positional("files").required())
        .env(EnvTemplate::literal("LC_ALL", "C"))
}

#[derive(Serialize)]
struct GrepRequest {
    ignore_case: bool,
    max_count: Option<u32>,
    patterns: Vec<String>,
    files: Vec<String>,
}

#[test]
fn renders_in_declaration_order() {
    let request = request_from(&GrepRequest {
        ignore_case: true,
        max_count: Some(3),
        patterns: vec!["foo".into(), "bar".into()],
        files: vec!["a.txt".into(), "b.txt".into()],
    })
    .unwrap();

    let argv = build(&request, &grep_spec()).unwrap();
    assert_eq!(argv.program(), "grep");
    assert_eq!(
        argv.args(),
        ["-i", "--max-count=3", "-e", "foo", "-e", "bar", "--", "a.txt", "b.txt"]
    );
    assert_eq!(argv.env().get("LC_ALL").map(String::as_str), Some("C"));
}

#[test]
fn absent_optional_fields_emit_nothing() {
    let request = request_from(&GrepRequest {
        ignore_case: false,
        max_count: None,
        patterns: Vec::new(),
        files: vec!["a.txt".into()],
    })
    .unwrap();

    let argv = build(&request, &grep_spec()).unwrap();
    assert_eq!(argv.args(), ["--", "a.txt"]);
}

#[test]
fn output_is_deterministic() {
    let request = request_from(&json!({
        "ignore_case": true,
        "patterns": ["x", "y", "z"],
        "files": ["one", "two"],
    }))
    .unwrap();
    let spec = grep_spec();

    let first = build(&request, &spec).unwrap();
    for _ in 0..10 {
        assert_eq!(build(&request, &spec).unwrap(), first);
    }
    assert_eq!(first.to_string(), build(&request, &spec).unwrap().to_string());
}

#[test]
fn scenario_a_single_positional() {
    let spec = CommandSpec::new("true").arg(ArgTemplate::positional("path").required());
    let request = request_from(&json!({"path": "a.txt"})).unwrap();
    let argv = build(&request, &spec).unwrap();
    assert_eq!(argv.args(), ["a.txt"]);
}

#[test]
fn hostile_values_stay_single_entries() {
    let spec = CommandSpec::new("cat").arg(ArgTemplate::positional("path"));
    for hostile in [
        "a.txt; rm -rf /",
        "a.txt && echo pwned",
        "$(reboot)",
        "`id`",
        "two words",
        "quote'd \"value\"",
        "tab\tseparated",
        "*",
    ] {
        let request = request_from(&json!({"path": hostile})).unwrap();
        let argv = build(&request, &spec).unwrap();
        assert_eq!(argv.args(), [hostile], "value {hostile:?} was split");
    }
}

#[test]
fn joined_flag_keeps_value_in_one_token() {
    let spec = CommandSpec::new("tool").arg(ArgTemplate::flag("name", "--name").joined());
    let request = request_from(&json!({"name": "x --force"})).unwrap();
    let argv = build(&request, &spec).unwrap();
    assert_eq!(argv.args(), ["--name=x --force"]);
}

#[test]
fn leading_dash_rejected_when_constrained() {
    let spec = CommandSpec::new("cat")
        .arg(ArgTemplate::positional("path").constraint(Constraint::NoLeadingDash));
    let request = request_from(&json!({"path": "--help"})).unwrap();
    let err = assert_err!(build(&request, &spec));
    assert!(matches!(err, RequestError::ForbiddenValue { ref field, .. } if field == "path"));
}

#[test]
fn positional_rejects_option_like_values_by_default() {
    let spec = CommandSpec::new("cat").arg(ArgTemplate::positional("path"));
    for value in ["--output=/x", "-rf"] {
        let request = request_from(&json!({"path": value})).unwrap();
        let err = assert_err!(build(&request, &spec));
        assert!(matches!(err, RequestError::ForbiddenValue { ref field, .. } if field == "path"));
    }

    let spec = CommandSpec::new("cat").arg(ArgTemplate::positional("paths"));
    let request = request_from(&json!({"paths": ["ok.txt", "--force"]})).unwrap();
    assert_err!(build(&request, &spec));
}

#[test]
fn positional_leading_dash_can_be_allowed() {
    let spec = CommandSpec::new("seq")
        .arg(ArgTemplate::literal("--"))
        .arg(ArgTemplate::positional("start").allow_leading_dash());
    let request = request_from(&json!({"start": -5})).unwrap();
    let argv = assert_ok!(build(&request, &spec));
    assert_eq!(argv.args(), ["--", "-5"]);

    let template: ArgTemplate = serde_json::from_value(json!({
        "field": "start",
        "render": {"kind": "positional"},
        "allow_leading_dash": true,
    }))
    .unwrap();
    let spec = CommandSpec::new("seq").arg(template);
    let argv = assert_ok!(build(&request, &spec));
    assert_eq!(argv.args(), ["-5"]);
}

#[test]
fn flag_values_may_start_with_dash() {
    let spec = CommandSpec::new("tool").arg(ArgTemplate::flag("offset", "--offset"));
    let request = request_from(&json!({"offset": "-3"})).unwrap();
    let argv = assert_ok!(build(&request, &spec));
    assert_eq!(argv.args(), ["--offset", "-3"]);
}

#[test]
fn nul_bytes_always_rejected() {
    let spec = CommandSpec::new("cat").arg(ArgTemplate::positional("path"));
    let request = request_from(&json!({"path": "a\u{0}b"})).unwrap();
    assert!(matches!(
        build(&request, &spec),
        Err(RequestError::ForbiddenValue { .. })
    ));
}

#[test]
fn missing_required_field() {
    let spec = CommandSpec::new("cat").arg(ArgTemplate::positional("path").required());
    let err = assert_err!(build(&serde_json::Map::new(), &spec));
    assert!(matches!(err, RequestError::MissingField(ref f) if f == "path"));
}

#[test]
fn switch_styles() {
    let request = request_from(&json!({"verbose": false})).unwrap();

    let presence = CommandSpec::new("t").arg(ArgTemplate::switch("verbose", "--verbose"));
    assert!(assert_ok!(build(&request, &presence)).args().is_empty());

    let joined = CommandSpec::new("t").arg(ArgTemplate::switch("verbose", "--verbose").joined());
    assert_eq!(assert_ok!(build(&request, &joined)).args(), ["--verbose=false"]);

    let separate = CommandSpec::new("t")
        .arg(ArgTemplate::switch("verbose", "--verbose").switch_style(SwitchStyle::Separate));
    assert_eq!(
        assert_ok!(build(&request, &separate)).args(),
        ["--verbose", "false"]
    );
}

#[test]
fn switch_requires_boolean() {
    let spec = CommandSpec::new("t").arg(ArgTemplate::switch("verbose", "--verbose"));
    let request = request_from(&json!({"verbose": "yes"})).unwrap();
    assert!(matches!(
        build(&request, &spec),
        Err(RequestError::UnsupportedValue { .. })
    ));
}

#[test]
fn non_default_condition() {
    let spec = CommandSpec::new("t")
        .arg(ArgTemplate::flag("depth", "--depth").when(Condition::NonDefault));
    let zero = request_from(&json!({"depth": 0})).unwrap();
    assert!(build(&zero, &spec).unwrap().args().is_empty());
    let two = request_from(&json!({"depth": 2})).unwrap();
    assert_eq!(build(&two, &spec).unwrap().args(), ["--depth", "2"]);
}

#[test]
fn stdin_from_field() {
    let spec = CommandSpec::new("cat").stdin(StdinSpec::Field {
        field: "input".to_string(),
    });
    let request = request_from(&json!({"input": "line\n"})).unwrap();
    let argv = build(&request, &spec).unwrap();
    assert_eq!(argv.stdin(), &StdinSource::Bytes(b"line\n".to_vec()));
}

#[test]
fn non_object_request_rejected() {
    assert!(matches!(
        request_from(&json!(["a"])),
        Err(RequestError::NotAnObject)
    ));
}
