//! Request → argument vector rendering.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use super::spec::{
    ArgTemplate, CommandSpec, Constraint, EnvSource, EnvTemplate, FlagStyle, Render, StdinSpec,
    SwitchStyle,
};
use super::vector::{ArgumentVector, StdinSource};

/// A typed request, as a JSON object of named fields.
pub type Request = Map<String, Value>;

/// Error type for request validation.
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    /// The request did not serialize to an object.
    #[error("Request must be an object")]
    NotAnObject,
    /// A required field is absent or null.
    #[error("Missing required field: {0}")]
    MissingField(String),
    /// The field's type cannot be rendered by its template.
    #[error("Unsupported value for field {field}: expected {expected}")]
    UnsupportedValue {
        field: String,
        expected: &'static str,
    },
    /// A rendered value broke one of the field's constraints.
    #[error("Forbidden value for field {field}: {reason}")]
    ForbiddenValue { field: String, reason: String },
    /// Environment variable name is empty or contains `=` or NUL.
    #[error("Invalid environment variable name: {0:?}")]
    InvalidEnvName(String),
    /// A value-rendering template does not name a field.
    #[error("Argument template #{position} renders a value but names no field")]
    UnboundTemplate { position: usize },
    /// The request value could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convert any serializable value into a [`Request`].
///
/// # Errors
///
/// Returns `RequestError::NotAnObject` unless `value` serializes to an object.
pub fn request_from<T: Serialize>(value: &T) -> Result<Request, RequestError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(RequestError::NotAnObject),
    }
}

/// Render a request into an argument vector.
///
/// Templates are evaluated in declaration order, so the output is a pure
/// function of `(request, spec)`. Every value taken from the request becomes
/// its own argv entry (or the value half of a `--flag=value` token); nothing
/// is ever concatenated into shell text.
///
/// # Errors
///
/// Returns `RequestError` if a required field is missing, a value has the
/// wrong shape for its template, or a value breaks a constraint.
pub fn build(request: &Request, spec: &CommandSpec) -> Result<ArgumentVector, RequestError> {
    let mut args = Vec::new();
    for (position, template) in spec.arg_templates().iter().enumerate() {
        render_arg(request, position, template, &mut args)?;
    }

    let mut env = BTreeMap::new();
    for template in spec.env_templates() {
        if let Some(value) = render_env(request, template)? {
            env.insert(template.name().to_string(), value);
        }
    }

    let stdin = match spec.stdin_spec() {
        StdinSpec::Null => StdinSource::Null,
        StdinSpec::Inherit => StdinSource::Inherit,
        StdinSpec::Field { field } => match request.get(field).filter(|v| !v.is_null()) {
            Some(Value::String(s)) => StdinSource::Bytes(s.clone().into_bytes()),
            Some(other) => StdinSource::Bytes(serde_json::to_vec(other)?),
            None => StdinSource::Null,
        },
    };

    Ok(ArgumentVector::new(
        spec.program().to_string(),
        args,
        env,
        spec.clears_env(),
        spec.get_working_dir().cloned(),
        stdin,
    ))
}

fn render_arg(
    request: &Request,
    position: usize,
    template: &ArgTemplate,
    out: &mut Vec<String>,
) -> Result<(), RequestError> {
    let value = template.field().and_then(|f| request.get(f));

    if template.is_required() && value.filter(|v| !v.is_null()).is_none() {
        let name = template.field().unwrap_or_default().to_string();
        return Err(RequestError::MissingField(name));
    }
    if !template.condition().holds(value) {
        return Ok(());
    }

    if let Render::Literal { value } = template.render() {
        out.push(value.clone());
        return Ok(());
    }

    let field = template
        .field()
        .ok_or(RequestError::UnboundTemplate { position })?;
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(());
    };

    match template.render() {
        Render::Literal { .. } => {}
        Render::Flag { flag, style } => {
            let text = scalar_text(field, value)?;
            check(field, &text, template.constraints())?;
            push_flag(out, flag, *style, text);
        }
        Render::Positional => {
            for item in elements(value) {
                let text = scalar_text(field, item)?;
                if !template.allows_leading_dash() {
                    check(field, &text, &[Constraint::NoLeadingDash])?;
                }
                check(field, &text, template.constraints())?;
                out.push(text);
            }
        }
        Render::Repeated { flag, style } => {
            for item in elements(value) {
                let text = scalar_text(field, item)?;
                check(field, &text, template.constraints())?;
                push_flag(out, flag, *style, text);
            }
        }
        Render::Switch { flag, style } => {
            let Value::Bool(enabled) = value else {
                return Err(RequestError::UnsupportedValue {
                    field: field.to_string(),
                    expected: "boolean",
                });
            };
            match style {
                SwitchStyle::Presence => {
                    if *enabled {
                        out.push(flag.clone());
                    }
                }
                SwitchStyle::Joined => out.push(format!("{flag}={enabled}")),
                SwitchStyle::Separate => {
                    out.push(flag.clone());
                    out.push(enabled.to_string());
                }
            }
        }
    }
    Ok(())
}

fn render_env(request: &Request, template: &EnvTemplate) -> Result<Option<String>, RequestError> {
    let name = template.name();
    if name.is_empty() || name.contains(['=', '\0']) {
        return Err(RequestError::InvalidEnvName(name.to_string()));
    }

    let (field, value) = match template.source() {
        EnvSource::Literal(text) => (name, Some(Value::String(text.clone()))),
        EnvSource::Field(field) => (field.as_str(), request.get(field).cloned()),
    };

    if template.is_required() && value.as_ref().filter(|v| !v.is_null()).is_none() {
        return Err(RequestError::MissingField(field.to_string()));
    }
    if !template.condition().holds(value.as_ref()) {
        return Ok(None);
    }
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };

    let text = scalar_text(field, &value)?;
    check(field, &text, template.constraints())?;
    Ok(Some(text))
}

fn push_flag(out: &mut Vec<String>, flag: &str, style: FlagStyle, value: String) {
    match style {
        FlagStyle::Separate => {
            out.push(flag.to_string());
            out.push(value);
        }
        FlagStyle::Joined => out.push(format!("{flag}={value}")),
    }
}

fn elements(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn scalar_text(field: &str, value: &Value) -> Result<String, RequestError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(RequestError::UnsupportedValue {
            field: field.to_string(),
            expected: "string, number or boolean",
        }),
    }
}

fn check(field: &str, value: &str, constraints: &[Constraint]) -> Result<(), RequestError> {
    if value.contains('\0') {
        return Err(RequestError::ForbiddenValue {
            field: field.to_string(),
            reason: "value contains a NUL byte".to_string(),
        });
    }
    if let Some(reason) = constraints.iter().find_map(|c| c.violation(value)) {
        return Err(RequestError::ForbiddenValue {
            field: field.to_string(),
            reason,
        });
    }
    Ok(())
}
