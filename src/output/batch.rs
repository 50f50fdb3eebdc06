//! Batch interpretation of complete captured output.

use serde::de::DeserializeOwned;

use super::{decode, ParseStrategy};
use crate::error::BridgeError;

/// Parse complete stdout into the caller's result type.
///
/// # Errors
///
/// Returns `BridgeError::MalformedOutput`, carrying the raw stdout, when the
/// strategy rejects the output or the parsed value does not fit `T`.
pub fn parse_batch<T: DeserializeOwned>(
    strategy: &ParseStrategy,
    stdout: &str,
) -> Result<T, BridgeError> {
    let malformed = |reason: String| BridgeError::MalformedOutput {
        reason,
        stdout: stdout.to_string(),
    };

    let value = strategy.parse_document(stdout).map_err(malformed)?;
    decode(value).map_err(|e| malformed(e.to_string()))
}
