//! Trusted publishing: exchange a runner identity token for an upload token.

use super::{CredentialProvider, CredentialSource, PublishCredential};
use crate::errors::CredentialError;
use crate::utils::{now_utc, timestamps::from_unix_seconds};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

/// Runner variable holding the identity-token endpoint.
pub const ID_TOKEN_REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
/// Runner variable holding the bearer token for that endpoint.
pub const ID_TOKEN_REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 15;

#[derive(Debug, Deserialize)]
struct AudienceResponse {
    audience: String,
}

#[derive(Debug, Deserialize)]
struct IdTokenResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    token: String,
    #[serde(default)]
    expires: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MintErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<MintErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct MintErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// Credential provider backed by the runner's identity-token endpoint and
/// the index's token-minting endpoint.
#[derive(Clone)]
pub struct TrustedPublishingProvider {
    client: Client,
    audience_url: String,
    mint_token_url: String,
    request_url: Option<String>,
    request_token: Option<String>,
}

impl TrustedPublishingProvider {
    /// Creates a provider with explicit runner endpoint settings.
    #[must_use]
    pub fn new(
        audience_url: impl Into<String>,
        mint_token_url: impl Into<String>,
        request_url: Option<String>,
        request_token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            audience_url: audience_url.into(),
            mint_token_url: mint_token_url.into(),
            request_url,
            request_token,
        }
    }

    /// Creates a provider reading the runner endpoint from the environment.
    #[must_use]
    pub fn from_env(audience_url: impl Into<String>, mint_token_url: impl Into<String>) -> Self {
        Self::new(
            audience_url,
            mint_token_url,
            std::env::var(ID_TOKEN_REQUEST_URL_VAR).ok(),
            std::env::var(ID_TOKEN_REQUEST_TOKEN_VAR).ok(),
        )
    }

    async fn audience(&self) -> Result<String, CredentialError> {
        let response = self
            .client
            .get(&self.audience_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CredentialError::Transport(e.to_string()))?;
        let body: AudienceResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;
        Ok(body.audience)
    }

    async fn identity_token(&self, audience: &str) -> Result<String, CredentialError> {
        let (Some(url), Some(bearer)) = (&self.request_url, &self.request_token) else {
            return Err(CredentialError::Unavailable(format!(
                "{ID_TOKEN_REQUEST_URL_VAR} and {ID_TOKEN_REQUEST_TOKEN_VAR} must be set; \
                 grant the job `id-token: write`"
            )));
        };

        let response = self
            .client
            .get(url)
            .query(&[("audience", audience)])
            .bearer_auth(bearer)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;
        let body: IdTokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;
        Ok(body.value)
    }

    async fn mint(&self, id_token: &str) -> Result<MintResponse, CredentialError> {
        let response = self
            .client
            .post(&self.mint_token_url)
            .json(&serde_json::json!({ "token": id_token }))
            .send()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(CredentialError::ExchangeRejected(describe_mint_error(
                status.as_u16(),
                &text,
            )));
        }
        serde_json::from_str(&text).map_err(|e| CredentialError::Transport(e.to_string()))
    }
}

impl fmt::Debug for TrustedPublishingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedPublishingProvider")
            .field("audience_url", &self.audience_url)
            .field("mint_token_url", &self.mint_token_url)
            .field("request_url", &self.request_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for TrustedPublishingProvider {
    async fn acquire(&self, environment: &str) -> Result<PublishCredential, CredentialError> {
        let audience = self.audience().await?;
        let id_token = self.identity_token(&audience).await?;

        let claimed = environment_claim(&id_token)?;
        if claimed.as_deref() != Some(environment) {
            return Err(CredentialError::EnvironmentMismatch {
                expected: environment.to_string(),
                actual: claimed.unwrap_or_else(|| "<none>".to_string()),
            });
        }

        let minted = self.mint(&id_token).await?;
        let expires_at = minted
            .expires
            .and_then(from_unix_seconds)
            .unwrap_or_else(|| now_utc() + chrono::Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES));

        tracing::info!(environment, %expires_at, "Minted short-lived upload token");
        Ok(
            PublishCredential::new(minted.token, environment, CredentialSource::TrustedPublishing)
                .with_expiry(expires_at),
        )
    }
}

/// Extracts the `environment` claim from an unverified JWT payload.
fn environment_claim(jwt: &str) -> Result<Option<String>, CredentialError> {
    let malformed = |reason: &str| CredentialError::Unavailable(format!("malformed identity token: {reason}"));

    let payload = jwt.split('.').nth(1).ok_or_else(|| malformed("missing payload"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| malformed(&e.to_string()))?;
    let claims: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| malformed(&e.to_string()))?;

    Ok(claims
        .get("environment")
        .and_then(serde_json::Value::as_str)
        .map(String::from))
}

fn describe_mint_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<MintErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.description))
            .collect::<Vec<_>>()
            .join("; "),
        Ok(MintErrorResponse {
            message: Some(message),
            ..
        }) => message,
        _ => format!("HTTP {status}"),
    }
}
