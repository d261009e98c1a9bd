//! Trigger events and the version-tag filter.

use crate::errors::ConfigError;
use crate::utils::GlobPattern;
use serde::{Deserialize, Serialize};

const TAG_REF_PREFIX: &str = "refs/tags/";

/// A pushed git ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// The ref as reported by the runner (`refs/tags/v1.2.0`), or a bare tag.
    pub git_ref: String,
}

impl TriggerEvent {
    /// Creates an event for a pushed ref.
    #[must_use]
    pub fn new(git_ref: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
        }
    }

    /// Returns the tag name if the ref is a tag.
    ///
    /// `refs/tags/<tag>` yields `<tag>`; a bare name without a `refs/`
    /// prefix is taken as a tag; branches and other refs yield `None`.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        if let Some(tag) = self.git_ref.strip_prefix(TAG_REF_PREFIX) {
            return (!tag.is_empty()).then_some(tag);
        }
        if self.git_ref.starts_with("refs/") || self.git_ref.is_empty() {
            return None;
        }
        Some(&self.git_ref)
    }
}

/// What to do with a trigger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    /// Start a run for this tag.
    Run {
        /// The matched tag.
        tag: String,
    },
    /// Do nothing.
    Ignore {
        /// Why the event was ignored.
        reason: String,
    },
}

impl TriggerDecision {
    /// Returns true if a run should start.
    #[must_use]
    pub fn should_run(&self) -> bool {
        matches!(self, Self::Run { .. })
    }
}

/// Version-tag filter: a ref triggers a run only if its tag matches one
/// of the patterns.
#[derive(Debug, Clone)]
pub struct TagFilter {
    patterns: Vec<GlobPattern>,
}

impl TagFilter {
    /// Creates a filter from compiled patterns.
    #[must_use]
    pub fn new(patterns: Vec<GlobPattern>) -> Self {
        Self { patterns }
    }

    /// Compiles a filter from pattern strings.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(GlobPattern::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Decides whether an event starts a run.
    #[must_use]
    pub fn evaluate(&self, event: &TriggerEvent) -> TriggerDecision {
        let Some(tag) = event.tag_name() else {
            return TriggerDecision::Ignore {
                reason: format!("'{}' is not a tag", event.git_ref),
            };
        };

        if self.patterns.iter().any(|p| p.is_match(tag)) {
            TriggerDecision::Run {
                tag: tag.to_string(),
            }
        } else {
            let patterns: Vec<&str> = self.patterns.iter().map(GlobPattern::as_str).collect();
            TriggerDecision::Ignore {
                reason: format!("tag '{tag}' matches none of [{}]", patterns.join(", ")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filter() -> TagFilter {
        TagFilter::from_patterns(["v*"]).unwrap()
    }

    #[test]
    fn test_tag_name_extraction() {
        assert_eq!(TriggerEvent::new("refs/tags/v1.0").tag_name(), Some("v1.0"));
        assert_eq!(TriggerEvent::new("v1.0").tag_name(), Some("v1.0"));
        assert_eq!(TriggerEvent::new("refs/heads/main").tag_name(), None);
        assert_eq!(TriggerEvent::new("refs/tags/").tag_name(), None);
        assert_eq!(TriggerEvent::new("").tag_name(), None);
    }

    #[test]
    fn test_version_tag_runs() {
        let decision = filter().evaluate(&TriggerEvent::new("refs/tags/v0.4.2"));
        assert_eq!(
            decision,
            TriggerDecision::Run {
                tag: "v0.4.2".to_string()
            }
        );
        assert!(decision.should_run());
    }

    #[test]
    fn test_branch_push_is_ignored() {
        let decision = filter().evaluate(&TriggerEvent::new("refs/heads/v1-maintenance"));
        assert!(!decision.should_run());
    }

    #[test]
    fn test_non_matching_tag_is_ignored() {
        match filter().evaluate(&TriggerEvent::new("refs/tags/nightly")) {
            TriggerDecision::Ignore { reason } => assert!(reason.contains("nightly")),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_any_pattern_may_match() {
        let filter = TagFilter::from_patterns(["v*", "release-*"]).unwrap();
        assert!(filter.evaluate(&TriggerEvent::new("release-2024")).should_run());
    }
}
