//! Build matrix expansion.
//!
//! The matrix is the cartesian product of the configured operating systems
//! and runtime versions, enumerated os-major, minus explicit exclusions.
//! Each surviving pair gets a job index (its position in the enumeration)
//! and an artifact key derived from `(os, job_index)`, so parallel wheel
//! jobs never write to the same key.

use crate::config::MatrixConfig;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Target platform understood by the wheel build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Linux runners.
    Linux,
    /// macOS runners.
    Macos,
    /// Windows runners.
    Windows,
}

impl Platform {
    /// Infers the platform from a runner OS identifier such as
    /// `ubuntu-22.04` or `macos-latest`.
    #[must_use]
    pub fn from_os_identifier(os: &str) -> Option<Self> {
        let os = os.to_ascii_lowercase();
        if os.starts_with("ubuntu") || os.contains("linux") {
            Some(Self::Linux)
        } else if os.starts_with("macos") || os.contains("darwin") || os.starts_with("osx") {
            Some(Self::Macos)
        } else if os.starts_with("windows") || os.starts_with("win") {
            Some(Self::Windows)
        } else {
            None
        }
    }

    /// Returns the platform this process runs on, if it is one of ours.
    #[must_use]
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Self::Macos)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else {
            None
        }
    }

    /// Returns the name passed to the build tool.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(os, runtime)` point of the build matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Operating system identifier.
    pub os: String,
    /// Runtime version tag.
    pub runtime: String,
    /// Position in the expanded matrix.
    pub job_index: usize,
    /// Platform derived from `os`.
    pub platform: Platform,
    /// Artifact store key this entry writes.
    pub artifact_key: String,
}

impl MatrixEntry {
    /// Returns the job name used in the job graph.
    #[must_use]
    pub fn job_name(&self) -> String {
        format!("build-wheels-{}-{}", self.os, self.runtime)
    }

    /// Renders the build selector for this entry.
    ///
    /// `{runtime}` and `{os}` in the template are replaced; everything else
    /// is passed through unchanged.
    #[must_use]
    pub fn selector(&self, template: &str) -> String {
        template
            .replace("{runtime}", &self.runtime)
            .replace("{os}", &self.os)
    }
}

/// Returns the artifact key for the wheels of one matrix entry.
#[must_use]
pub fn wheel_artifact_key(prefix: &str, os: &str, job_index: usize) -> String {
    format!("{prefix}wheels-{os}-{job_index}")
}

/// The expanded, validated build matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildMatrix {
    entries: Vec<MatrixEntry>,
}

impl BuildMatrix {
    /// Expands a matrix configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if either axis is empty, an
    /// identifier is empty, contains whitespace or `/`, appears twice, names
    /// an unknown platform, or if exclusions remove every entry.
    pub fn expand(config: &MatrixConfig, prefix: &str) -> Result<Self, ConfigError> {
        let platforms = validate_axis("matrix.os", &config.os)?
            .iter()
            .map(|os| {
                Platform::from_os_identifier(os).ok_or_else(|| {
                    ConfigError::invalid("matrix.os", format!("unknown platform for '{os}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        validate_axis("matrix.runtime", &config.runtime)?;

        for exclude in &config.exclude {
            if !config.os.contains(&exclude.os) || !config.runtime.contains(&exclude.runtime) {
                tracing::warn!(
                    os = %exclude.os,
                    runtime = %exclude.runtime,
                    "Matrix exclusion matches no entry"
                );
            }
        }

        let mut entries = Vec::new();
        for (os, platform) in config.os.iter().zip(platforms) {
            for runtime in &config.runtime {
                let excluded = config
                    .exclude
                    .iter()
                    .any(|e| &e.os == os && &e.runtime == runtime);
                if excluded {
                    continue;
                }

                let job_index = entries.len();
                entries.push(MatrixEntry {
                    os: os.clone(),
                    runtime: runtime.clone(),
                    job_index,
                    platform,
                    artifact_key: wheel_artifact_key(prefix, os, job_index),
                });
            }
        }

        if entries.is_empty() {
            return Err(ConfigError::invalid(
                "matrix.exclude",
                "exclusions remove every matrix entry",
            ));
        }

        let distinct: HashSet<&str> = entries.iter().map(|e| e.artifact_key.as_str()).collect();
        debug_assert_eq!(distinct.len(), entries.len());

        Ok(Self { entries })
    }

    /// Returns the entries in job-index order.
    #[must_use]
    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the matrix has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every wheel artifact key.
    #[must_use]
    pub fn artifact_keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.artifact_key.as_str()).collect()
    }
}

fn validate_axis<'a>(field: &str, values: &'a [String]) -> Result<&'a [String], ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::invalid(field, "must list at least one value"));
    }

    let mut seen = HashSet::new();
    for value in values {
        if value.is_empty() || value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                field,
                format!("'{value}' is not a valid identifier"),
            ));
        }
        if !seen.insert(value.as_str()) {
            return Err(ConfigError::invalid(field, format!("'{value}' is listed twice")));
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixExclude;
    use pretty_assertions::assert_eq;

    fn config(os: &[&str], runtime: &[&str]) -> MatrixConfig {
        MatrixConfig {
            os: os.iter().map(|s| (*s).to_string()).collect(),
            runtime: runtime.iter().map(|s| (*s).to_string()).collect(),
            exclude: Vec::new(),
            fail_fast: true,
        }
    }

    #[test]
    fn test_expansion_is_os_major() {
        let matrix =
            BuildMatrix::expand(&config(&["ubuntu-latest", "macos-14"], &["cp311", "cp312"]), "cibw-")
                .unwrap();

        let pairs: Vec<(&str, &str, usize)> = matrix
            .entries()
            .iter()
            .map(|e| (e.os.as_str(), e.runtime.as_str(), e.job_index))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("ubuntu-latest", "cp311", 0),
                ("ubuntu-latest", "cp312", 1),
                ("macos-14", "cp311", 2),
                ("macos-14", "cp312", 3),
            ]
        );
        assert_eq!(matrix.entries()[2].platform, Platform::Macos);
    }

    #[test]
    fn test_artifact_keys_are_pairwise_distinct() {
        let matrix = BuildMatrix::expand(
            &config(
                &["ubuntu-latest", "windows-latest", "macos-latest"],
                &["cp39", "cp310", "cp311", "cp312"],
            ),
            "cibw-",
        )
        .unwrap();

        let keys = matrix.artifact_keys();
        let distinct: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), 12);
        assert_eq!(distinct.len(), 12);
        assert_eq!(keys[0], "cibw-wheels-ubuntu-latest-0");
        assert_eq!(keys[11], "cibw-wheels-macos-latest-11");
    }

    #[test]
    fn test_exclusions_shift_job_indexes() {
        let mut cfg = config(&["ubuntu-latest", "windows-latest"], &["cp39", "cp310"]);
        cfg.exclude.push(MatrixExclude {
            os: "windows-latest".to_string(),
            runtime: "cp39".to_string(),
        });

        let matrix = BuildMatrix::expand(&cfg, "cibw-").unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.entries()[2].runtime, "cp310");
        assert_eq!(matrix.entries()[2].job_index, 2);
        assert_eq!(matrix.entries()[2].artifact_key, "cibw-wheels-windows-latest-2");
    }

    #[test]
    fn test_everything_excluded() {
        let mut cfg = config(&["ubuntu-latest"], &["cp39"]);
        cfg.exclude.push(MatrixExclude {
            os: "ubuntu-latest".to_string(),
            runtime: "cp39".to_string(),
        });
        assert!(BuildMatrix::expand(&cfg, "cibw-").is_err());
    }

    #[test]
    fn test_invalid_axes() {
        assert!(BuildMatrix::expand(&config(&[], &["cp39"]), "p-").is_err());
        assert!(BuildMatrix::expand(&config(&["ubuntu-latest"], &[]), "p-").is_err());
        assert!(BuildMatrix::expand(&config(&["ubuntu-latest", "ubuntu-latest"], &["cp39"]), "p-").is_err());
        assert!(BuildMatrix::expand(&config(&["solaris"], &["cp39"]), "p-").is_err());
        assert!(BuildMatrix::expand(&config(&["ubuntu latest"], &["cp39"]), "p-").is_err());
    }

    #[test]
    fn test_selector_rendering() {
        let matrix = BuildMatrix::expand(&config(&["ubuntu-latest"], &["cp310"]), "cibw-").unwrap();
        let entry = &matrix.entries()[0];
        assert_eq!(entry.selector("{runtime}-*"), "cp310-*");
        assert_eq!(entry.selector("{runtime}-{os}"), "cp310-ubuntu-latest");
        assert_eq!(entry.job_name(), "build-wheels-ubuntu-latest-cp310");
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(Platform::from_os_identifier("ubuntu-22.04"), Some(Platform::Linux));
        assert_eq!(Platform::from_os_identifier("macos-13"), Some(Platform::Macos));
        assert_eq!(Platform::from_os_identifier("windows-2022"), Some(Platform::Windows));
        assert_eq!(Platform::from_os_identifier("freebsd"), None);
    }
}
