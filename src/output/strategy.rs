//! Output modes and parsing strategies.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PatternSet;

/// How stdout is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Accumulate until exit, then parse once.
    #[default]
    Batch,
    /// Parse line by line while the process runs.
    Streaming,
}

/// How a piece of output turns into a value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParseStrategy {
    /// One JSON document.
    #[default]
    Json,
    /// One JSON document per line.
    JsonLines,
    /// Raw text.
    Text,
    /// Regex extraction rules.
    Pattern(PatternSet),
}

impl ParseStrategy {
    /// Parse complete captured stdout.
    ///
    /// # Errors
    ///
    /// Returns the reason the output could not be parsed.
    pub fn parse_document(&self, stdout: &str) -> Result<Value, String> {
        match self {
            Self::Json if stdout.trim().is_empty() => Ok(Value::Null),
            Self::Json => serde_json::from_str(stdout).map_err(|e| e.to_string()),
            Self::JsonLines => stdout
                .lines()
                .filter(|line| !line.trim().is_empty())
                .enumerate()
                .map(|(i, line)| {
                    serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Text => Ok(Value::String(trim_newline(stdout).to_string())),
            Self::Pattern(set) => set.extract(stdout).map(Value::Object),
        }
    }

    /// Parse a single streamed unit (one line, without its terminator).
    ///
    /// # Errors
    ///
    /// Returns the reason the line could not be parsed.
    pub fn parse_unit(&self, line: &str) -> Result<Value, String> {
        match self {
            Self::Json | Self::JsonLines => serde_json::from_str(line).map_err(|e| e.to_string()),
            Self::Text => Ok(Value::String(line.to_string())),
            Self::Pattern(set) => set.extract(line).map(Value::Object),
        }
    }
}

/// Output configuration of a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default)]
    pub parse: ParseStrategy,
}

impl OutputSpec {
    #[must_use]
    pub fn batch(parse: ParseStrategy) -> Self {
        Self {
            mode: OutputMode::Batch,
            parse,
        }
    }

    #[must_use]
    pub fn streaming(parse: ParseStrategy) -> Self {
        Self {
            mode: OutputMode::Streaming,
            parse,
        }
    }
}

/// Decode a parsed value into the caller's type.
///
/// `null` (what empty JSON output parses to) falls back to an empty object,
/// so result structs whose fields all have defaults decode from empty output.
///
/// # Errors
///
/// Returns `serde_json::Error` if the value does not fit `T`.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    if value.is_null() {
        if let Ok(decoded) = serde_json::from_value(Value::Null) {
            return Ok(decoded);
        }
        return serde_json::from_value(Value::Object(Map::new()));
    }
    serde_json::from_value(value)
}

fn trim_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
