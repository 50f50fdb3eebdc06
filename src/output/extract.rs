//! Pattern-based extraction for text and tabular tool output.

use std::collections::BTreeMap;

use regex::Captures;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::pattern::Pattern;

/// Type a captured string is converted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Float,
    Bool,
}

impl FieldType {
    fn convert(self, field: &str, raw: &str) -> Result<Value, String> {
        let invalid = || format!("field {field}: cannot read {raw:?} as {self:?}");
        match self {
            Self::String => Ok(Value::String(raw.to_string())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid()),
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid),
            Self::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
        }
    }
}

/// One extraction rule. Named capture groups become result fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    pattern: Pattern,
    /// Collect every match as an object into this array field.
    #[serde(default)]
    rows: Option<String>,
    #[serde(default)]
    coerce: BTreeMap<String, FieldType>,
}

impl ExtractionRule {
    /// Create a rule from a regex with named groups.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if the pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            rows: None,
            coerce: BTreeMap::new(),
        })
    }

    /// Collect all matches into `field` as an array of objects.
    #[must_use]
    pub fn rows(mut self, field: impl Into<String>) -> Self {
        self.rows = Some(field.into());
        self
    }

    /// Convert the named group to `field_type`.
    #[must_use]
    pub fn coerce(mut self, group: impl Into<String>, field_type: FieldType) -> Self {
        self.coerce.insert(group.into(), field_type);
        self
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn fields(&self, caps: &Captures<'_>) -> Result<Map<String, Value>, String> {
        let mut fields = Map::new();
        for name in self.pattern.regex().capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                let field_type = self.coerce.get(name).copied().unwrap_or_default();
                fields.insert(name.to_string(), field_type.convert(name, m.as_str())?);
            }
        }
        Ok(fields)
    }
}

/// Ordered extraction rules plus the fields that must be found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSet {
    #[serde(default)]
    rules: Vec<ExtractionRule>,
    #[serde(default)]
    required: Vec<String>,
}

impl PatternSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Earlier rules win per field.
    #[must_use]
    pub fn rule(mut self, rule: ExtractionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Require `field` to be extracted.
    #[must_use]
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    /// Apply every rule to `text`, first matching rule wins per field.
    ///
    /// # Errors
    ///
    /// Returns the reason if a capture cannot be coerced or a required field
    /// was never matched.
    pub fn extract(&self, text: &str) -> Result<Map<String, Value>, String> {
        let mut result = Map::new();

        for rule in &self.rules {
            let regex = rule.pattern.regex();
            if let Some(field) = &rule.rows {
                if result.contains_key(field) {
                    continue;
                }
                let rows = regex
                    .captures_iter(text)
                    .map(|caps| rule.fields(&caps).map(Value::Object))
                    .collect::<Result<Vec<_>, _>>()?;
                if !rows.is_empty() {
                    result.insert(field.clone(), Value::Array(rows));
                }
            } else if let Some(caps) = regex.captures(text) {
                for (name, value) in rule.fields(&caps)? {
                    result.entry(name).or_insert(value);
                }
            }
        }

        if let Some(missing) = self.required.iter().find(|f| !result.contains_key(*f)) {
            return Err(format!("required field {missing} not found in output"));
        }
        Ok(result)
    }
}
