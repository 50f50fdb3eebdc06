//! Colored terminal output for the command-line front-end.
//!
//! Results and events go to stdout as JSON so they can be piped. Status
//! lines and errors go to stderr.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::args::ArgumentVector;
use crate::bridge::StreamSummary;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Longest stderr excerpt shown with an error.
const STDERR_EXCERPT_LEN: usize = 400;

/// Truncate a string to at most `max_len` bytes on a char boundary, adding
/// an ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let mut end = max_len - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Process exit code for a failed call.
#[must_use]
pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidRequest => 2,
        ErrorKind::SpawnFailed => 3,
        ErrorKind::Timeout => 4,
        ErrorKind::Cancelled => 5,
        ErrorKind::MalformedOutput => 6,
        ErrorKind::ProcessFailed => 7,
        ErrorKind::ToolFailed => 8,
        ErrorKind::Io => 9,
    }
}

/// Print the configured operations.
pub fn print_operations(config: &BridgeConfig) {
    if config.operations.is_empty() {
        println!("{}", "No operations configured".dimmed());
    }
    for (name, operation) in &config.operations {
        let spec = operation.command_spec();
        println!(
            "{} {} {}",
            name.bold(),
            spec.program().cyan(),
            format!("({:?})", spec.output_spec().mode).dimmed()
        );
    }
    let _ = io::stdout().flush();
}

/// Print a rendered invocation.
pub fn print_invocation(argv: &ArgumentVector) {
    println!("{argv}");
    let _ = io::stdout().flush();
}

/// Print a status line announcing a call.
pub fn print_call_start(operation: &str, argv: &ArgumentVector) {
    eprintln!(
        "{} {} {} {}",
        timestamp().dimmed(),
        "[CALL]".blue().bold(),
        operation.bold(),
        truncate(&argv.to_string(), 120).dimmed()
    );
}

/// Print one value as a JSON line.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or stdout is closed.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()
}

/// Print the summary of a finished stream.
pub fn print_summary(summary: &StreamSummary) {
    let label = if summary.malformed > 0 {
        "[DONE]".yellow().bold().to_string()
    } else {
        "[DONE]".green().bold().to_string()
    };
    eprintln!(
        "{} {} events={} malformed={} exit={} {}",
        timestamp().dimmed(),
        label,
        summary.events,
        summary.malformed,
        summary.exit.code,
        format!("({}ms)", summary.elapsed.as_millis()).dimmed()
    );
}

/// Print a failed call, with a stderr excerpt when there is one.
pub fn print_error(err: &BridgeError) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        format!("[{:?}]", err.kind()).red().bold(),
        err
    );
    if let Some(stderr) = err.stderr().map(str::trim).filter(|s| !s.is_empty()) {
        eprintln!("{}", truncate(stderr, STDERR_EXCERPT_LEN).dimmed());
    }
    if let BridgeError::MalformedOutput { stdout, .. } = err {
        eprintln!("{}", truncate(stdout, STDERR_EXCERPT_LEN).dimmed());
    }
}

/// Print a plain message as an error.
pub fn print_message(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
