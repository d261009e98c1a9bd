//! `RELEASEFLOW_*` environment overrides.

use super::ReleaseConfig;
use crate::errors::ConfigError;

/// Prefix of every recognised override variable.
pub const ENV_PREFIX: &str = "RELEASEFLOW_";

impl ReleaseConfig {
    /// Applies overrides from `(name, value)` pairs.
    ///
    /// Recognised names (after [`ENV_PREFIX`]): `MATRIX_OS` and
    /// `MATRIX_RUNTIME` (comma-separated lists), `BUILD_SELECTOR`,
    /// `MIN_RUNTIME`, `TOOL_VERSION`, `PUBLISH_ENVIRONMENT`,
    /// `REPOSITORY_URL` and `DRY_RUN`. Unrelated variables are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list or an unparsable boolean.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();

            match key {
                "MATRIX_OS" => self.matrix.os = split_list(key, value)?,
                "MATRIX_RUNTIME" => self.matrix.runtime = split_list(key, value)?,
                "BUILD_SELECTOR" => self.build.selector = value.to_string(),
                "MIN_RUNTIME" => self.build.min_runtime = value.to_string(),
                "TOOL_VERSION" => self.build.tool_version = value.to_string(),
                "PUBLISH_ENVIRONMENT" => self.publish.environment = value.to_string(),
                "REPOSITORY_URL" => self.publish.repository_url = value.to_string(),
                "DRY_RUN" => self.publish.dry_run = parse_bool(key, value)?,
                _ => tracing::debug!(variable = %name.as_ref(), "Ignoring unknown override"),
            }
        }
        Ok(())
    }
}

fn split_list(key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if items.is_empty() {
        return Err(ConfigError::invalid(
            format!("{ENV_PREFIX}{key}"),
            "list must contain at least one value",
        ));
    }
    Ok(items)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::invalid(
            format!("{ENV_PREFIX}{key}"),
            format!("'{other}' is not a boolean"),
        )),
    }
}
