//! Classification of a finished process.

use std::time::Duration;

use super::TranslationRules;
use crate::error::BridgeError;
use crate::process::ExitStatus;

/// Classify a finished process.
///
/// Timeout and cancellation win over everything else, whatever the exit
/// code or stderr say. Then the rules are tried in order and the first
/// match becomes `ToolFailed`. A clean exit with no matching rule succeeds;
/// any other exit is `ProcessFailed`. `timeout` is only used to report the
/// enforced deadline.
///
/// # Errors
///
/// Returns the classified failure.
pub fn translate(
    status: &ExitStatus,
    stderr: &str,
    rules: &TranslationRules,
    timeout: Duration,
) -> Result<(), BridgeError> {
    if status.timed_out {
        return Err(BridgeError::Timeout { timeout });
    }
    if status.cancelled {
        return Err(BridgeError::Cancelled);
    }

    for rule in rules.rules() {
        if let Some(detail) = rule.evaluate(status, stderr) {
            tracing::debug!(kind = %rule.kind(), code = status.code, "Translation rule matched");
            return Err(BridgeError::ToolFailed {
                kind: rule.kind().clone(),
                detail,
                code: status.code,
                stderr: stderr.to_string(),
            });
        }
    }

    if status.success() {
        return Ok(());
    }
    Err(BridgeError::ProcessFailed {
        code: status.code,
        signal: status.signal,
        stderr: stderr.to_string(),
    })
}
