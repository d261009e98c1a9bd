//! Release configuration.
//!
//! A release is described by one YAML document:
//!
//! ```yaml
//! trigger:
//!   tags: ["v*"]
//! matrix:
//!   os: [ubuntu-latest, windows-latest, macos-latest]
//!   runtime: [cp39, cp310, cp311, cp312]
//!   exclude:
//!     - { os: windows-latest, runtime: cp39 }
//!   fail_fast: true
//! build:
//!   selector: "{runtime}-*"
//!   min_runtime: ">=3.9"
//!   tool_version: "2.16.5"
//! artifacts:
//!   prefix: "cibw-"
//! publish:
//!   environment: pypi
//! ```
//!
//! Every section is optional and falls back to the defaults shown above.
//! `RELEASEFLOW_*` environment variables override individual fields, see
//! [`ReleaseConfig::apply_env_overrides`].

mod overrides;

use crate::errors::ConfigError;
use crate::matrix::BuildMatrix;
use crate::utils::GlobPattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use overrides::ENV_PREFIX;

/// Complete configuration of one release pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Which refs start a run.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// The wheel build matrix.
    #[serde(default)]
    pub matrix: MatrixConfig,
    /// Inputs for the external build tools.
    #[serde(default)]
    pub build: BuildConfig,
    /// Artifact naming and storage.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Package index and credential settings.
    #[serde(default)]
    pub publish: PublishConfig,
    /// Scratch directory for build outputs and the flattened dist dir.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".releaseflow")
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            matrix: MatrixConfig::default(),
            build: BuildConfig::default(),
            artifacts: ArtifactConfig::default(),
            publish: PublishConfig::default(),
            work_dir: default_work_dir(),
        }
    }
}

impl ReleaseConfig {
    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed YAML or wrongly typed fields.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Loads a file, applies `RELEASEFLOW_*` overrides from the process
    /// environment and validates the result.
    ///
    /// # Errors
    ///
    /// Returns the first load, override or validation error.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field that can be checked without running anything.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tag_patterns()?;

        if self.artifacts.prefix.is_empty() || self.artifacts.prefix.contains('/') {
            return Err(ConfigError::invalid(
                "artifacts.prefix",
                "must be non-empty and contain no '/'",
            ));
        }
        GlobPattern::new(self.artifacts.wheel_glob.as_str())?;
        GlobPattern::new(self.artifacts.sdist_glob.as_str())?;
        GlobPattern::prefix(&self.artifacts.prefix)?;

        if self.build.selector.trim().is_empty() {
            return Err(ConfigError::invalid("build.selector", "must not be empty"));
        }
        if self.build.min_runtime.trim().is_empty() {
            return Err(ConfigError::invalid("build.min_runtime", "must not be empty"));
        }
        if !is_version_pin(&self.build.tool_version) {
            return Err(ConfigError::invalid(
                "build.tool_version",
                format!("'{}' is not an exact version pin", self.build.tool_version),
            ));
        }

        if self.publish.environment.trim().is_empty() {
            return Err(ConfigError::invalid(
                "publish.environment",
                "an authorization environment is required to publish",
            ));
        }
        for (field, url) in [
            ("publish.repository_url", &self.publish.repository_url),
            ("publish.audience_url", &self.publish.audience_url),
            ("publish.mint_token_url", &self.publish.mint_token_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::invalid(field, format!("'{url}' is not an http(s) URL")));
            }
        }

        BuildMatrix::expand(&self.matrix, &self.artifacts.prefix)?;
        Ok(())
    }

    /// Compiles the trigger tag patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if no pattern is configured or one does not compile.
    pub fn tag_patterns(&self) -> Result<Vec<GlobPattern>, ConfigError> {
        if self.trigger.tags.is_empty() {
            return Err(ConfigError::invalid("trigger.tags", "at least one pattern is required"));
        }
        self.trigger.tags.iter().map(|p| GlobPattern::new(p.as_str())).collect()
    }

    /// Returns the artifact key of the source distribution.
    #[must_use]
    pub fn sdist_key(&self) -> String {
        format!("{}sdist", self.artifacts.prefix)
    }
}

fn is_version_pin(version: &str) -> bool {
    !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Tag glob patterns; a run starts when the pushed tag matches any.
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

fn default_tags() -> Vec<String> {
    vec!["v*".to_string()]
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { tags: default_tags() }
    }
}

/// One `(os, runtime)` pair removed from the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixExclude {
    /// Operating system identifier.
    pub os: String,
    /// Runtime identifier.
    pub runtime: String,
}

/// Build matrix settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Operating system identifiers (e.g. `ubuntu-latest`).
    #[serde(default = "default_os")]
    pub os: Vec<String>,
    /// Runtime version tags (e.g. `cp311`).
    #[serde(default = "default_runtime")]
    pub runtime: Vec<String>,
    /// Pairs removed from the cartesian product.
    #[serde(default)]
    pub exclude: Vec<MatrixExclude>,
    /// Abort the remaining builds as soon as one fails.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_os() -> Vec<String> {
    ["ubuntu-latest", "windows-latest", "macos-latest"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_runtime() -> Vec<String> {
    ["cp39", "cp310", "cp311", "cp312"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_fail_fast() -> bool {
    true
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            os: default_os(),
            runtime: default_runtime(),
            exclude: Vec::new(),
            fail_fast: default_fail_fast(),
        }
    }
}

/// Inputs handed to the external build tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build selector template; `{runtime}` and `{os}` are substituted.
    #[serde(default = "default_selector")]
    pub selector: String,
    /// Minimum supported runtime constraint.
    #[serde(default = "default_min_runtime")]
    pub min_runtime: String,
    /// Exact version of the wheel build tool.
    #[serde(default = "default_tool_version")]
    pub tool_version: String,
    /// Interpreter used to run the build tools.
    #[serde(default = "default_python")]
    pub python: String,
    /// Project checkout to build.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
}

fn default_selector() -> String {
    "{runtime}-*".to_string()
}

fn default_min_runtime() -> String {
    ">=3.9".to_string()
}

fn default_tool_version() -> String {
    "2.16.5".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            selector: default_selector(),
            min_runtime: default_min_runtime(),
            tool_version: default_tool_version(),
            python: default_python(),
            project_dir: default_project_dir(),
        }
    }
}

/// Artifact naming and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Prefix shared by every artifact key; the publisher collects `{prefix}*`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Files a wheel build must leave in its output directory.
    #[serde(default = "default_wheel_glob")]
    pub wheel_glob: String,
    /// File the sdist build must leave in its output directory.
    #[serde(default = "default_sdist_glob")]
    pub sdist_glob: String,
    /// Directory for a filesystem-backed store; in-memory when unset.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

fn default_prefix() -> String {
    "cibw-".to_string()
}

fn default_wheel_glob() -> String {
    "*.whl".to_string()
}

fn default_sdist_glob() -> String {
    "*.tar.gz".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            wheel_glob: default_wheel_glob(),
            sdist_glob: default_sdist_glob(),
            store_dir: None,
        }
    }
}

/// Package index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Name of the authorization environment the index trusts.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Upload endpoint.
    #[serde(default = "default_repository_url")]
    pub repository_url: String,
    /// Endpoint returning the audience for identity tokens.
    #[serde(default = "default_audience_url")]
    pub audience_url: String,
    /// Endpoint exchanging an identity token for an upload token.
    #[serde(default = "default_mint_token_url")]
    pub mint_token_url: String,
    /// Collect and flatten artifacts but do not upload.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_environment() -> String {
    "pypi".to_string()
}

fn default_repository_url() -> String {
    "https://upload.pypi.org/legacy/".to_string()
}

fn default_audience_url() -> String {
    "https://pypi.org/_/oidc/audience".to_string()
}

fn default_mint_token_url() -> String {
    "https://pypi.org/_/oidc/mint-token".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            repository_url: default_repository_url(),
            audience_url: default_audience_url(),
            mint_token_url: default_mint_token_url(),
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ReleaseConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.trigger.tags, vec!["v*".to_string()]);
        assert_eq!(config.matrix.os.len(), 3);
        assert!(config.matrix.fail_fast);
        assert_eq!(config.artifacts.prefix, "cibw-");
        assert_eq!(config.publish.environment, "pypi");
        config.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
trigger:
  tags: ["v*", "release-*"]
matrix:
  os: [ubuntu-latest, macos-latest]
  runtime: [cp311]
  exclude:
    - { os: macos-latest, runtime: cp311 }
  fail_fast: false
build:
  selector: "{runtime}-manylinux*"
  min_runtime: ">=3.11"
  tool_version: "2.17.0"
artifacts:
  prefix: "dist-"
  store_dir: /tmp/store
publish:
  environment: release
  dry_run: true
work_dir: /tmp/work
"#;
        let config = ReleaseConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.trigger.tags.len(), 2);
        assert_eq!(config.matrix.exclude[0].os, "macos-latest");
        assert!(!config.matrix.fail_fast);
        assert_eq!(config.build.tool_version, "2.17.0");
        assert_eq!(config.artifacts.store_dir, Some(PathBuf::from("/tmp/store")));
        assert!(config.publish.dry_run);
        assert_eq!(config.sdist_key(), "dist-sdist");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_environment_is_rejected() {
        let mut config = ReleaseConfig::default();
        config.publish.environment = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("publish.environment"));
    }

    #[test]
    fn test_tool_version_must_be_exact_pin() {
        let mut config = ReleaseConfig::default();
        for bad in ["", "latest", ">=2.0", "2..1"] {
            config.build.tool_version = bad.to_string();
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }
        config.build.tool_version = "2.16.5".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_prefix() {
        let mut config = ReleaseConfig::default();
        config.artifacts.prefix = "a/b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_tag_patterns() {
        let mut config = ReleaseConfig::default();
        config.trigger.tags.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = ReleaseConfig::from_yaml_str("matrix: { fail_fast: maybe }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release.yaml");
        std::fs::write(&path, "publish:\n  environment: staging\n").unwrap();

        let config = ReleaseConfig::load(&path).unwrap();
        assert_eq!(config.publish.environment, "staging");

        let missing = ReleaseConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
