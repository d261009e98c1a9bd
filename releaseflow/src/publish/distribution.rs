//! Distribution file name parsing.
//!
//! Wheels follow `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`;
//! source distributions are `{name}-{version}.tar.gz` (or `.zip`).

use crate::errors::PublishRejection;
use serde::Serialize;

/// What kind of distribution a file is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionKind {
    /// A binary wheel.
    Wheel {
        /// Optional build tag.
        build_tag: Option<String>,
        /// Python tag (e.g. `cp311`).
        python_tag: String,
        /// ABI tag.
        abi_tag: String,
        /// Platform tag.
        platform_tag: String,
    },
    /// A source archive.
    Sdist,
}

/// A parsed distribution file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionFilename {
    /// The file name as given.
    pub file_name: String,
    /// Project name, as spelled in the file name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Wheel tags or sdist.
    pub kind: DistributionKind,
}

impl DistributionFilename {
    /// Parses a distribution file name.
    ///
    /// # Errors
    ///
    /// Returns `PublishRejection::InvalidDistribution` for any other file.
    pub fn parse(file_name: &str) -> Result<Self, PublishRejection> {
        let invalid = |message: &str| PublishRejection::InvalidDistribution {
            file_name: file_name.to_string(),
            message: message.to_string(),
        };

        if let Some(stem) = strip_suffix_ignore_case(file_name, ".whl") {
            let parts: Vec<&str> = stem.split('-').collect();
            if parts.iter().any(|p| p.is_empty()) {
                return Err(invalid("wheel name has an empty component"));
            }
            let (build_tag, tags) = match parts.len() {
                5 => (None, &parts[2..]),
                6 => (Some(parts[2].to_string()), &parts[3..]),
                _ => {
                    return Err(invalid(
                        "wheel names need name, version, python, abi and platform tags",
                    ))
                }
            };
            return Ok(Self {
                file_name: file_name.to_string(),
                name: parts[0].to_string(),
                version: parts[1].to_string(),
                kind: DistributionKind::Wheel {
                    build_tag,
                    python_tag: tags[0].to_string(),
                    abi_tag: tags[1].to_string(),
                    platform_tag: tags[2].to_string(),
                },
            });
        }

        let stem = strip_suffix_ignore_case(file_name, ".tar.gz")
            .or_else(|| strip_suffix_ignore_case(file_name, ".zip"))
            .ok_or_else(|| invalid("only wheels (.whl) and sdists (.tar.gz, .zip) can be published"))?;
        let (name, version) = stem
            .rsplit_once('-')
            .filter(|(n, v)| !n.is_empty() && !v.is_empty())
            .ok_or_else(|| invalid("sdist names need a name and a version"))?;

        Ok(Self {
            file_name: file_name.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            kind: DistributionKind::Sdist,
        })
    }

    /// Returns the upload `filetype` field.
    #[must_use]
    pub fn filetype(&self) -> &'static str {
        match self.kind {
            DistributionKind::Wheel { .. } => "bdist_wheel",
            DistributionKind::Sdist => "sdist",
        }
    }

    /// Returns the upload `pyversion` field.
    #[must_use]
    pub fn pyversion(&self) -> &str {
        match &self.kind {
            DistributionKind::Wheel { python_tag, .. } => python_tag,
            DistributionKind::Sdist => "source",
        }
    }

    /// Returns true for wheels.
    #[must_use]
    pub fn is_wheel(&self) -> bool {
        matches!(self.kind, DistributionKind::Wheel { .. })
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_wheel() {
        let dist =
            DistributionFilename::parse("demo_pkg-1.2.0-cp311-cp311-manylinux_2_17_x86_64.whl")
                .unwrap();
        assert_eq!(dist.name, "demo_pkg");
        assert_eq!(dist.version, "1.2.0");
        assert_eq!(dist.filetype(), "bdist_wheel");
        assert_eq!(dist.pyversion(), "cp311");
        assert!(dist.is_wheel());
    }

    #[test]
    fn test_parse_wheel_with_build_tag() {
        let dist = DistributionFilename::parse("demo-1.0-1-py3-none-any.whl").unwrap();
        assert_eq!(
            dist.kind,
            DistributionKind::Wheel {
                build_tag: Some("1".to_string()),
                python_tag: "py3".to_string(),
                abi_tag: "none".to_string(),
                platform_tag: "any".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_sdist() {
        let dist = DistributionFilename::parse("demo-pkg-1.2.0.tar.gz").unwrap();
        assert_eq!(dist.name, "demo-pkg");
        assert_eq!(dist.version, "1.2.0");
        assert_eq!(dist.filetype(), "sdist");
        assert_eq!(dist.pyversion(), "source");
        assert!(DistributionFilename::parse("demo-1.0.ZIP").is_ok());
    }

    #[test]
    fn test_rejects_other_files() {
        for name in ["notes.txt", "demo.whl", "demo-1.0-py3.whl", "demo.tar.gz", "-1.0.tar.gz"] {
            assert!(
                matches!(
                    DistributionFilename::parse(name),
                    Err(PublishRejection::InvalidDistribution { .. })
                ),
                "{name} should be rejected"
            );
        }
    }
}
