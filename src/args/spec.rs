//! Command specifications: how a request renders into an invocation.
//!
//! A [`CommandSpec`] is plain data. Each wrapped operation gets one, built
//! by hand with the builder methods below or deserialized from TOML, and
//! it is reused across every call of that operation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::OutputSpec;
use crate::pattern::Pattern;

/// Immutable description of how to build one invocation of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    #[serde(default)]
    args: Vec<ArgTemplate>,
    #[serde(default)]
    env: Vec<EnvTemplate>,
    #[serde(default)]
    clear_env: bool,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    stdin: StdinSpec,
    #[serde(default)]
    output: OutputSpec,
}

impl CommandSpec {
    /// Create a spec for the given executable with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            clear_env: false,
            working_dir: None,
            stdin: StdinSpec::default(),
            output: OutputSpec::default(),
        }
    }

    /// Append an argument template.
    #[must_use]
    pub fn arg(mut self, template: ArgTemplate) -> Self {
        self.args.push(template);
        self
    }

    /// Append an environment variable template.
    #[must_use]
    pub fn env(mut self, template: EnvTemplate) -> Self {
        self.env.push(template);
        self
    }

    /// Start the child with an empty environment plus the rendered overlay.
    #[must_use]
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Set the working directory for the child.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Configure what the child sees on stdin.
    #[must_use]
    pub fn stdin(mut self, stdin: StdinSpec) -> Self {
        self.stdin = stdin;
        self
    }

    /// Configure how stdout is interpreted.
    #[must_use]
    pub fn output(mut self, output: OutputSpec) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn arg_templates(&self) -> &[ArgTemplate] {
        &self.args
    }

    #[must_use]
    pub fn env_templates(&self) -> &[EnvTemplate] {
        &self.env
    }

    #[must_use]
    pub fn clears_env(&self) -> bool {
        self.clear_env
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    #[must_use]
    pub fn stdin_spec(&self) -> &StdinSpec {
        &self.stdin
    }

    #[must_use]
    pub fn output_spec(&self) -> &OutputSpec {
        &self.output
    }
}

/// One entry of the argument list, evaluated in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgTemplate {
    /// Request field this template reads. Only `Literal` may omit it.
    #[serde(default)]
    field: Option<String>,
    render: Render,
    #[serde(default)]
    when: Condition,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    constraints: Vec<Constraint>,
    /// Let positional values start with `-`. Off by default so a request
    /// value can never be read as an option.
    #[serde(default)]
    allow_leading_dash: bool,
}

impl ArgTemplate {
    fn with_render(field: Option<String>, render: Render) -> Self {
        Self {
            field,
            render,
            when: Condition::Always,
            required: false,
            constraints: Vec::new(),
            allow_leading_dash: false,
        }
    }

    /// A fixed token, always emitted.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::with_render(
            None,
            Render::Literal {
                value: value.into(),
            },
        )
    }

    /// A fixed token emitted only when `field` satisfies the condition set
    /// with [`ArgTemplate::when`].
    #[must_use]
    pub fn literal_if(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_render(
            Some(field.into()),
            Render::Literal {
                value: value.into(),
            },
        )
        .when(Condition::Present)
    }

    /// `--flag value` for a scalar field. Skipped when the field is absent.
    #[must_use]
    pub fn flag(field: impl Into<String>, flag: impl Into<String>) -> Self {
        Self::with_render(
            Some(field.into()),
            Render::Flag {
                flag: flag.into(),
                style: FlagStyle::Separate,
            },
        )
        .when(Condition::Present)
    }

    /// A bare positional value; arrays expand to one entry per element.
    ///
    /// Values starting with `-` are rejected unless
    /// [`ArgTemplate::allow_leading_dash`] is set.
    #[must_use]
    pub fn positional(field: impl Into<String>) -> Self {
        Self::with_render(Some(field.into()), Render::Positional).when(Condition::Present)
    }

    /// One `--flag value` per element of an array field.
    #[must_use]
    pub fn repeated(field: impl Into<String>, flag: impl Into<String>) -> Self {
        Self::with_render(
            Some(field.into()),
            Render::Repeated {
                flag: flag.into(),
                style: FlagStyle::Separate,
            },
        )
        .when(Condition::Present)
    }

    /// A boolean field rendered as a bare `--flag` when true.
    #[must_use]
    pub fn switch(field: impl Into<String>, flag: impl Into<String>) -> Self {
        Self::with_render(
            Some(field.into()),
            Render::Switch {
                flag: flag.into(),
                style: SwitchStyle::Presence,
            },
        )
        .when(Condition::Present)
    }

    /// Accept positional values that start with `-`, such as negative
    /// numbers. Pair it with a preceding `--` literal when the tool supports
    /// one.
    #[must_use]
    pub fn allow_leading_dash(mut self) -> Self {
        self.allow_leading_dash = true;
        self
    }

    /// Render flags as a single `--flag=value` token.
    #[must_use]
    pub fn joined(mut self) -> Self {
        match &mut self.render {
            Render::Flag { style, .. } | Render::Repeated { style, .. } => {
                *style = FlagStyle::Joined;
            }
            Render::Switch { style, .. } => *style = SwitchStyle::Joined,
            Render::Literal { .. } | Render::Positional => {}
        }
        self
    }

    /// Set the switch rendering style.
    #[must_use]
    pub fn switch_style(mut self, new_style: SwitchStyle) -> Self {
        if let Render::Switch { style, .. } = &mut self.render {
            *style = new_style;
        }
        self
    }

    /// Emit only if the field satisfies `condition`.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = condition;
        self
    }

    /// Fail the call when the field is absent.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Add a constraint on rendered values.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[must_use]
    pub fn render(&self) -> &Render {
        &self.render
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.when
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[must_use]
    pub fn allows_leading_dash(&self) -> bool {
        self.allow_leading_dash
    }
}

/// Rendering rule for an argument template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Render {
    /// Fixed token.
    Literal { value: String },
    /// Flag followed by the field's value.
    Flag {
        flag: String,
        #[serde(default)]
        style: FlagStyle,
    },
    /// The field's value on its own.
    Positional,
    /// One flag occurrence per element.
    Repeated {
        flag: String,
        #[serde(default)]
        style: FlagStyle,
    },
    /// Boolean field.
    Switch {
        flag: String,
        #[serde(default)]
        style: SwitchStyle,
    },
}

/// How a flag and its value are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStyle {
    /// `--flag value` (two argv entries).
    #[default]
    Separate,
    /// `--flag=value` (one argv entry).
    Joined,
}

/// How a boolean field is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStyle {
    /// `--flag` when true, nothing when false.
    #[default]
    Presence,
    /// `--flag=true` / `--flag=false`.
    Joined,
    /// `--flag true` / `--flag false`.
    Separate,
}

/// Predicate deciding whether a template is emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    /// Field present and not null.
    Present,
    /// Field present and not null, false, 0, "", [] or {}.
    NonDefault,
    /// Field equal to the given value.
    Equals { value: Value },
}

impl Condition {
    /// Evaluate the condition against a field value (`None` when absent).
    #[must_use]
    pub fn holds(&self, value: Option<&Value>) -> bool {
        let present = value.filter(|v| !v.is_null());
        match self {
            Self::Always => true,
            Self::Present => present.is_some(),
            Self::NonDefault => present.is_some_and(|v| !is_default_value(v)),
            Self::Equals { value: expected } => value == Some(expected),
        }
    }
}

fn is_default_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Extra validation applied to every value a template renders.
///
/// NUL bytes are always rejected and need no constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Value must not start with `-`, so it cannot be read as a flag.
    NoLeadingDash,
    /// Value must not contain line breaks.
    NoNewline,
    /// Value must be one of the listed strings.
    OneOf { values: Vec<String> },
    /// Value must match the pattern.
    Matches { pattern: Pattern },
}

impl Constraint {
    /// Check a rendered value, returning the violation reason.
    #[must_use]
    pub fn violation(&self, value: &str) -> Option<String> {
        match self {
            Self::NoLeadingDash if value.starts_with('-') => {
                Some("value must not start with '-'".to_string())
            }
            Self::NoNewline if value.contains(['\n', '\r']) => {
                Some("value must not contain line breaks".to_string())
            }
            Self::OneOf { values } if !values.iter().any(|v| v == value) => {
                Some(format!("value must be one of: {}", values.join(", ")))
            }
            Self::Matches { pattern } if !pattern.is_match(value) => {
                Some(format!("value must match {pattern}"))
            }
            _ => None,
        }
    }
}

/// Environment variable template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvTemplate {
    name: String,
    source: EnvSource,
    #[serde(default)]
    when: Condition,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    constraints: Vec<Constraint>,
}

impl EnvTemplate {
    /// Set `name` from a request field, when present.
    #[must_use]
    pub fn field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Field(field.into()),
            when: Condition::Present,
            required: false,
            constraints: Vec::new(),
        }
    }

    /// Always set `name` to a fixed value.
    #[must_use]
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Literal(value.into()),
            when: Condition::Always,
            required: false,
            constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = condition;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> &EnvSource {
        &self.source
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.when
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

/// Where an environment variable's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    Field(String),
    Literal(String),
}

/// What the child sees on stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StdinSpec {
    /// Closed stdin.
    #[default]
    Null,
    /// Inherit the host's stdin.
    Inherit,
    /// Write a request field to stdin, then close it. Strings are written
    /// verbatim, anything else as JSON.
    Field { field: String },
}
