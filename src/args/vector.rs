//! Rendered invocation for a single call.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What to connect to the child's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Null,
    Inherit,
    Bytes(Vec<u8>),
}

/// Ordered argv plus environment overlay, built fresh for one call.
///
/// There are no mutators: once rendered, the vector is only read by the
/// process supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    clear_env: bool,
    working_dir: Option<PathBuf>,
    stdin: StdinSource,
}

impl ArgumentVector {
    pub(crate) fn new(
        program: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        clear_env: bool,
        working_dir: Option<PathBuf>,
        stdin: StdinSource,
    ) -> Self {
        Self {
            program,
            args,
            env,
            clear_env,
            working_dir,
            stdin,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[must_use]
    pub fn clears_env(&self) -> bool {
        self.clear_env
    }

    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    #[must_use]
    pub fn stdin(&self) -> &StdinSource {
        &self.stdin
    }
}

/// Shell-escaped rendering, for logs and dry runs only. The supervisor
/// never hands this string to a shell.
impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={}", escape(value)))
            .collect();
        parts.push(escape(&self.program));
        parts.extend(self.args.iter().map(|arg| escape(arg)));
        f.write_str(&parts.join(" "))
    }
}

fn escape(s: &str) -> String {
    shell_escape::escape(Cow::Borrowed(s)).into_owned()
}
