//! Short-lived publish credentials.

use crate::errors::CredentialError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Exchanged from a runner identity token.
    TrustedPublishing,
    /// Supplied directly (tests, local runs).
    Static,
}

/// An upload token scoped to one authorization environment.
///
/// Never serialized; `Debug` redacts the token.
#[derive(Clone)]
pub struct PublishCredential {
    token: String,
    environment: String,
    expires_at: Option<Timestamp>,
    source: CredentialSource,
}

impl PublishCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        environment: impl Into<String>,
        source: CredentialSource,
    ) -> Self {
        Self {
            token: token.into(),
            environment: environment.into(),
            expires_at: None,
            source,
        }
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the secret token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the environment this credential is scoped to.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the expiry, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Returns where the credential came from.
    #[must_use]
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Returns true if the credential expired at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for PublishCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishCredential")
            .field("token", &"<redacted>")
            .field("environment", &self.environment)
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

/// Obtains a fresh credential for each run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Acquires a credential scoped to `environment`.
    ///
    /// # Errors
    ///
    /// Returns a `CredentialError` if no credential can be issued.
    async fn acquire(&self, environment: &str) -> Result<PublishCredential, CredentialError>;
}

/// Hands out a fixed token for one environment.
#[derive(Clone)]
pub struct StaticCredentialProvider {
    token: String,
    environment: String,
}

impl StaticCredentialProvider {
    /// Creates a provider that only serves `environment`.
    #[must_use]
    pub fn new(token: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            environment: environment.into(),
        }
    }
}

impl fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire(&self, environment: &str) -> Result<PublishCredential, CredentialError> {
        if environment != self.environment {
            return Err(CredentialError::EnvironmentMismatch {
                expected: environment.to_string(),
                actual: self.environment.clone(),
            });
        }
        Ok(PublishCredential::new(
            &self.token,
            environment,
            CredentialSource::Static,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_debug_redacts_token() {
        let credential = PublishCredential::new("pypi-secret", "pypi", CredentialSource::Static);
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("pypi-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_expiry() {
        let now = crate::utils::now_utc();
        let credential = PublishCredential::new("t", "pypi", CredentialSource::Static);
        assert!(!credential.is_expired(now));

        let credential = credential.with_expiry(now - Duration::seconds(1));
        assert!(credential.is_expired(now));
        assert!(!credential
            .clone()
            .with_expiry(now + Duration::minutes(15))
            .is_expired(now));
    }

    #[tokio::test]
    async fn test_static_provider_checks_environment() {
        let provider = StaticCredentialProvider::new("t", "pypi");
        assert_eq!(provider.acquire("pypi").await.unwrap().token(), "t");
        assert!(matches!(
            provider.acquire("testpypi").await,
            Err(CredentialError::EnvironmentMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_acquire()
            .withf(|env| env == "release")
            .times(1)
            .returning(|env| {
                Ok(PublishCredential::new(
                    "minted",
                    env,
                    CredentialSource::TrustedPublishing,
                ))
            });

        let credential = provider.acquire("release").await.unwrap();
        assert_eq!(credential.source(), CredentialSource::TrustedPublishing);
    }
}
