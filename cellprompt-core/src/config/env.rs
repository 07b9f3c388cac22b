//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::CellpromptConfig;
use super::secrets::SecretString;
use regex::Regex;
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern")
});

/// Names of every `${VAR}` placeholder in `text`
pub fn extract_env_vars(text: &str) -> Vec<String> {
    ENV_VAR_PATTERN
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Replace every `${VAR}` in `content`, failing on the first unset variable
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        match env::var(&cap[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| cap[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Interpolate the fields that may still carry placeholders after parsing
///
/// Placeholders can survive when they were produced by a quoted YAML value
/// that itself referenced a variable.
pub fn interpolate_config_env_vars(config: &mut CellpromptConfig) -> Result<(), ConfigError> {
    for provider in &mut config.providers {
        if let Some(api_key) = &provider.api_key {
            if ENV_VAR_PATTERN.is_match(api_key.expose_secret()) {
                let interpolated = interpolate_env_vars(api_key.expose_secret())?;
                provider.api_key = Some(SecretString::new(interpolated));
            }
        }

        if let Some(base_url) = &provider.base_url {
            if ENV_VAR_PATTERN.is_match(base_url) {
                provider.base_url = Some(interpolate_env_vars(base_url)?);
            }
        }
    }

    Ok(())
}
