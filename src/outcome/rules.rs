//! Translation rules classifying a finished process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::Pattern;
use crate::process::ExitStatus;

/// Capture group read for the failure detail when a rule names none.
pub const DEFAULT_DETAIL_GROUP: &str = "detail";

/// Name of a tool-specific failure, such as `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureKind(String);

impl FailureKind {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exit code predicate of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMatch {
    /// Any exit code except 0.
    #[default]
    Nonzero,
    /// Every exit, including 0. Useful for tools that report errors on
    /// stderr and still exit 0.
    Any,
    /// One of the listed codes.
    Codes(Vec<i32>),
}

impl ExitMatch {
    #[must_use]
    pub fn matches(&self, code: i32) -> bool {
        match self {
            Self::Nonzero => code != 0,
            Self::Any => true,
            Self::Codes(codes) => codes.contains(&code),
        }
    }
}

/// Maps an exit code and/or stderr pattern to a failure kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRule {
    #[serde(default)]
    exit: ExitMatch,
    #[serde(default)]
    stderr: Option<Pattern>,
    kind: FailureKind,
    /// Capture group of `stderr` to report as the detail.
    #[serde(default)]
    detail: Option<String>,
}

impl TranslationRule {
    /// Rule for any nonzero exit.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            exit: ExitMatch::Nonzero,
            stderr: None,
            kind: FailureKind::new(kind),
            detail: None,
        }
    }

    /// Rule for specific exit codes.
    #[must_use]
    pub fn exit_codes(kind: impl Into<String>, codes: &[i32]) -> Self {
        Self::new(kind).exit(ExitMatch::Codes(codes.to_vec()))
    }

    #[must_use]
    pub fn exit(mut self, exit: ExitMatch) -> Self {
        self.exit = exit;
        self
    }

    /// Also require stderr to match `pattern`.
    #[must_use]
    pub fn stderr(mut self, pattern: Pattern) -> Self {
        self.stderr = Some(pattern);
        self
    }

    /// Report the named capture group of the stderr pattern as detail.
    #[must_use]
    pub fn detail_group(mut self, group: impl Into<String>) -> Self {
        self.detail = Some(group.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    /// Check the rule, returning the extracted detail on a match.
    ///
    /// The outer `Option` is the match, the inner one the detail.
    #[must_use]
    pub fn evaluate(&self, status: &ExitStatus, stderr: &str) -> Option<Option<String>> {
        if !self.exit.matches(status.code) {
            return None;
        }
        let Some(pattern) = &self.stderr else {
            return Some(None);
        };
        let caps = pattern.regex().captures(stderr)?;
        let group = self.detail.as_deref().unwrap_or(DEFAULT_DETAIL_GROUP);
        Some(caps.name(group).map(|m| m.as_str().trim().to_string()))
    }
}

/// Ordered rule list. First match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslationRules(Vec<TranslationRule>);

impl TranslationRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after the existing ones.
    #[must_use]
    pub fn rule(mut self, rule: TranslationRule) -> Self {
        self.0.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[TranslationRule] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<TranslationRule> for TranslationRules {
    fn from_iter<I: IntoIterator<Item = TranslationRule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
