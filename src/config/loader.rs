//! Locating and reading the operation catalogue.

use std::path::{Path, PathBuf};

use super::BridgeConfig;
use crate::args::Render;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".cli-bridge.toml";

/// Where the catalogue comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// First existing candidate wins; none at all means an empty catalogue.
    Discover(Vec<PathBuf>),
    /// Named by the caller, so it has to exist.
    Explicit(PathBuf),
}

/// Reads a [`BridgeConfig`] from TOML and checks every operation in it.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    source: Source,
}

impl ConfigLoader {
    /// Look in the working directory, then the user config directory.
    #[must_use]
    pub fn new() -> Self {
        let user = dirs::config_dir().map(|dir| dir.join("cli-bridge").join("config.toml"));
        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE))
            .chain(user)
            .collect();
        Self {
            source: Source::Discover(candidates),
        }
    }

    /// Read exactly `path`; a missing file is an error rather than defaults.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            source: Source::Explicit(path),
        }
    }

    /// Files this loader may read, most specific first.
    #[must_use]
    pub fn candidates(&self) -> &[PathBuf] {
        match &self.source {
            Source::Discover(paths) => paths,
            Source::Explicit(path) => std::slice::from_ref(path),
        }
    }

    /// The file [`ConfigLoader::load`] would read, if any.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when an explicit path does not exist.
    pub fn resolve(&self) -> Result<Option<PathBuf>, ConfigError> {
        match &self.source {
            Source::Explicit(path) if path.exists() => Ok(Some(path.clone())),
            Source::Explicit(path) => Err(ConfigError::NotFound(path.clone())),
            Source::Discover(paths) => Ok(paths.iter().find(|p| p.exists()).cloned()),
        }
    }

    /// Load the catalogue. Discovery with no file present yields an empty
    /// catalogue with default runtime settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing when named explicitly, or
    /// cannot be read, parsed or validated.
    pub fn load(&self) -> Result<BridgeConfig, ConfigError> {
        let Some(path) = self.resolve()? else {
            tracing::debug!(candidates = ?self.candidates(), "No config file found, using defaults");
            return Ok(BridgeConfig::default());
        };
        Self::load_from_path(&path)
    }

    /// Read, parse and validate one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an operation
    /// in it is unusable.
    pub fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BridgeConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        for (name, operation) in &config.operations {
            if let Some(reason) = problem(operation) {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    operation: name.clone(),
                    reason,
                });
            }
        }
        tracing::debug!(operations = config.operations.len(), "Loaded operation catalogue");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Mistakes that would otherwise only show up when the operation is called.
fn problem(operation: &super::Operation) -> Option<String> {
    let spec = operation.command_spec();
    if spec.program().trim().is_empty() {
        return Some("program is empty".to_string());
    }
    let unbound = spec
        .arg_templates()
        .iter()
        .position(|t| t.field().is_none() && !matches!(t.render(), Render::Literal { .. }));
    if let Some(position) = unbound {
        return Some(format!("argument #{position} renders a value but names no field"));
    }
    spec.env_templates()
        .iter()
        .map(crate::args::EnvTemplate::name)
        .find(|name| name.is_empty() || name.contains(['=', '\0']))
        .map(|name| format!("invalid environment variable name {name:?}"))
}

/// Errors from locating, reading or checking a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly named file does not exist.
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Not valid TOML, or a field has the wrong shape. Bad regexes land here.
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Operation {operation} in {} is unusable: {reason}", .path.display())]
    Invalid {
        path: PathBuf,
        operation: String,
        reason: String,
    },
}
