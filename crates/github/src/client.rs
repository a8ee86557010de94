//! Installation-scoped GitHub REST client.
//!
//! One [`GithubClient`] exists per dispatch, built around the installation
//! token issued for that dispatch. There are no retries and no client-side
//! timeouts: every failure is final for the event, and the hosting platform's
//! request ceiling bounds wall-clock time.

use async_trait::async_trait;
use base64::Engine;
use dispatch::errors::HostError;
use dispatch::identifiers::{BranchName, CommentId, InstallationId, IssueNumber};
use dispatch::ports::{HostConnector, RepositoryHost};
use dispatch::types::{FetchedFile, InstallationToken, ReactionKind, RepoId};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AppAuthenticator, AppCredentials};

/// Default REST API base.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    head: PullRequestHead,
}

#[derive(Deserialize)]
struct PullRequestHead {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct CommentCreateResponse {
    id: u64,
}

/// REST client authenticated with one installation token.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubClient {
    /// Builds a client whose every request carries the installation token and
    /// the REST API content-negotiation headers.
    pub fn new(api_base: impl Into<String>, token: &InstallationToken) -> Result<Self, HostError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("ralph-works"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let mut auth_value = reqwest::header::HeaderValue::from_str(&format!(
            "Bearer {}",
            token.reveal().trim()
        ))
        .map_err(|error| HostError::Credentials {
            reason: format!("installation token is not a valid header value: {error}"),
        })?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| HostError::Credentials {
                reason: format!("failed to build github client: {error}"),
            })?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, HostError> {
        request.send().await.map_err(|error| HostError::Transport {
            operation: operation.to_string(),
            reason: error.to_string(),
        })
    }

    async fn api_error(operation: &str, response: reqwest::Response) -> HostError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        HostError::Api {
            operation: operation.to_string(),
            status,
            body,
        }
    }
}

/// Decodes the contents API's base64 payload, which carries embedded
/// newlines.
fn decode_contents(operation: &str, encoded: &str) -> Result<String, HostError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|error| HostError::InvalidResponse {
            operation: operation.to_string(),
            reason: format!("content is not valid base64: {error}"),
        })?;
    String::from_utf8(bytes).map_err(|error| HostError::InvalidResponse {
        operation: operation.to_string(),
        reason: format!("content is not valid utf-8: {error}"),
    })
}

#[async_trait]
impl RepositoryHost for GithubClient {
    async fn file_content(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &BranchName,
    ) -> Result<Option<FetchedFile>, HostError> {
        let operation = "get file content";
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            path
        );
        let response = self
            .send(
                operation,
                self.http.get(&url).query(&[("ref", git_ref.as_str())]),
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(operation, response).await);
        }

        let contents: ContentsResponse =
            response
                .json()
                .await
                .map_err(|error| HostError::InvalidResponse {
                    operation: operation.to_string(),
                    reason: error.to_string(),
                })?;
        Ok(Some(FetchedFile {
            content: decode_contents(operation, &contents.content)?,
            sha: contents.sha,
        }))
    }

    async fn pull_request_head(
        &self,
        repo: &RepoId,
        number: IssueNumber,
    ) -> Result<Option<BranchName>, HostError> {
        let operation = "get pull request";
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            number
        );
        let response = self.send(operation, self.http.get(&url)).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(operation, response).await);
        }

        let pull: PullRequestResponse =
            response
                .json()
                .await
                .map_err(|error| HostError::InvalidResponse {
                    operation: operation.to_string(),
                    reason: error.to_string(),
                })?;
        Ok(BranchName::new(pull.head.name))
    }

    async fn create_comment(
        &self,
        repo: &RepoId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentId, HostError> {
        let operation = "create comment";
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base,
            repo.owner(),
            repo.name(),
            issue
        );
        let response = self
            .send(operation, self.http.post(&url).json(&json!({ "body": body })))
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(operation, response).await);
        }
        let created: CommentCreateResponse =
            response
                .json()
                .await
                .map_err(|error| HostError::InvalidResponse {
                    operation: operation.to_string(),
                    reason: error.to_string(),
                })?;
        Ok(CommentId::new(created.id))
    }

    async fn create_reaction(
        &self,
        repo: &RepoId,
        comment: CommentId,
        reaction: ReactionKind,
    ) -> Result<(), HostError> {
        let operation = "create reaction";
        let url = format!(
            "{}/repos/{}/{}/issues/comments/{}/reactions",
            self.api_base,
            repo.owner(),
            repo.name(),
            comment
        );
        let response = self
            .send(
                operation,
                self.http
                    .post(&url)
                    .json(&json!({ "content": reaction.as_api_str() })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(operation, response).await);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// [`HostConnector`] implementation: exchanges App credentials for an
/// installation token and hands back a client scoped to one dispatch.
pub struct GithubConnector {
    authenticator: AppAuthenticator,
    api_base: String,
}

impl GithubConnector {
    /// Creates a connector against the given API base.
    pub fn new(api_base: impl Into<String>, credentials: AppCredentials) -> Result<Self, HostError> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Ok(Self {
            authenticator: AppAuthenticator::new(api_base.clone(), credentials)?,
            api_base,
        })
    }
}

#[async_trait]
impl HostConnector for GithubConnector {
    async fn connect(
        &self,
        installation: InstallationId,
    ) -> Result<Box<dyn RepositoryHost>, HostError> {
        let token = self.authenticator.installation_token(installation).await?;
        Ok(Box::new(GithubClient::new(self.api_base.clone(), &token)?))
    }
}
