//! Configuration loading and validation
//!
//! Files are read as YAML or JSON, `${ENV_VAR}` placeholders are interpolated
//! before parsing, and the result is validated with field-path errors.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::extract_env_vars;
pub use error::{ConfigError, ValidationError, ValidationErrorKind};
pub use schema::{
    CacheConfig, CellpromptConfig, ConnectionConfig, LocalProcessConfig, ProviderConfiguration,
    ToolsConfig, CONFIG_VERSION,
};
pub use secrets::{is_sensitive_field, redact_by_field_name, SafeLogging, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

fn read(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    env::interpolate_env_vars(&content)
}

fn finish(mut config: CellpromptConfig) -> Result<CellpromptConfig, ConfigError> {
    env::interpolate_config_env_vars(&mut config)?;
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<CellpromptConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;

    let config: CellpromptConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<CellpromptConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;

    let config: CellpromptConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish(config)
}

/// Load a configuration, choosing the format from the file extension
pub fn load<P: AsRef<Path>>(path: P) -> Result<CellpromptConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => load_from_json(path),
        _ => load_from_yaml(path),
    }
}
