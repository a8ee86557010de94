//! App authentication: signed assertion → installation token.
//!
//! A GitHub App authenticates in two steps. First it signs a short-lived
//! RS256 assertion with its private key, binding issuer (the app id),
//! issued-at, and expiry. Then it exchanges that assertion, scoped to one
//! installation, for an installation access token at the host's
//! token-issuance endpoint.
//!
//! Tokens produced here are used for exactly one dispatch and discarded; no
//! caching across events is attempted, so every event pays one extra round
//! trip. Any failure along the way (key parsing, signing, the exchange call)
//! aborts the dispatch before further API calls are attempted.

use chrono::Utc;
use dispatch::errors::HostError;
use dispatch::identifiers::{AppId, InstallationId};
use dispatch::types::InstallationToken;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Allowance for clock drift between this host and the API: the assertion is
/// backdated by this many seconds.
const ISSUED_AT_DRIFT_SECS: i64 = 30;

/// Assertion lifetime. The host caps assertions at ten minutes; nine keeps a
/// margin under that ceiling even with the backdated issued-at.
const ASSERTION_TTL_SECS: i64 = 9 * 60;

/// Long-lived App identity: the registered app id and its RSA private key.
#[derive(Clone)]
pub struct AppCredentials {
    pub app_id: AppId,
    /// PEM-encoded RSA private key, as downloaded from the App settings page.
    pub private_key_pem: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct AssertionClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

/// Performs the two-step credential exchange against one API base.
pub struct AppAuthenticator {
    http: reqwest::Client,
    api_base: String,
    credentials: AppCredentials,
}

impl AppAuthenticator {
    /// Creates an authenticator for the given API base (no trailing slash
    /// required).
    pub fn new(api_base: impl Into<String>, credentials: AppCredentials) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .user_agent("ralph-works")
            .build()
            .map_err(|error| HostError::Credentials {
                reason: format!("failed to build http client: {error}"),
            })?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Builds and signs the RS256 App assertion.
    pub(crate) fn signed_assertion(&self) -> Result<String, HostError> {
        let issued_at = Utc::now().timestamp() - ISSUED_AT_DRIFT_SECS;
        let claims = AssertionClaims {
            iat: issued_at,
            exp: issued_at + ASSERTION_TTL_SECS,
            iss: self.credentials.app_id.to_string(),
        };
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key_pem.as_bytes()).map_err(
            |error| HostError::Credentials {
                reason: format!("failed to parse app private key: {error}"),
            },
        )?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|error| {
            HostError::Credentials {
                reason: format!("failed to sign app assertion: {error}"),
            }
        })
    }

    /// Exchanges the signed assertion for an installation-scoped token.
    pub async fn installation_token(
        &self,
        installation: InstallationId,
    ) -> Result<InstallationToken, HostError> {
        let assertion = self.signed_assertion()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&assertion)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("x-github-api-version", "2022-11-28")
            .send()
            .await
            .map_err(|error| HostError::Credentials {
                reason: format!("token exchange request failed: {error}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Credentials {
                reason: format!(
                    "token exchange failed with status {}: {}",
                    status.as_u16(),
                    body
                ),
            });
        }

        let exchanged: TokenExchangeResponse =
            response.json().await.map_err(|error| HostError::Credentials {
                reason: format!("failed to decode token exchange response: {error}"),
            })?;
        tracing::debug!(installation = %installation, expires_at = %exchanged.expires_at, "installation token issued");
        Ok(InstallationToken::new(
            exchanged.token,
            exchanged.expires_at,
        ))
    }
}
