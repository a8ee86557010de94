//! RalphWorks generative-text infrastructure adapter.
//!
//! Implements the [`dispatch::ports::CompletionProvider`] trait for
//! Anthropic's Messages API. Additional providers would be added as new types
//! in this crate without any changes to the `dispatch` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, and response
//! parsing live here. The [`dispatch`] crate sees only
//! [`dispatch::ports::CompletionProvider`].
//!
//! ## Failure policy
//!
//! One request per completion: no retries, no client timeout (the hosting
//! platform's request ceiling governs). A non-success status propagates the
//! service's error body verbatim so quota and model errors reach the
//! requesting human undistorted.

use async_trait::async_trait;
use dispatch::errors::CompletionError;
use dispatch::ports::{CompletionProvider, CompletionRequest};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

/// Pinned default model for analysis calls.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default Messages API base.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for the Messages API.
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    /// Model id sent with every request.
    pub model: String,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// Messages API client.
#[derive(Debug)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    config: AnthropicConfig,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl AnthropicProvider {
    /// Builds a provider; fails when the api key is empty or not a valid
    /// header value.
    pub fn new(config: AnthropicConfig) -> Result<Self, CompletionError> {
        if config.api_key.trim().is_empty() {
            return Err(CompletionError::InvalidResponse {
                reason: "api key is empty".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value = HeaderValue::from_str(config.api_key.trim()).map_err(|error| {
            CompletionError::InvalidResponse {
                reason: format!("api key is not a valid header value: {error}"),
            }
        })?;
        key_value.set_sensitive(true);
        headers.insert("x-api-key", key_value);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| CompletionError::Transport {
                reason: format!("failed to build http client: {error}"),
            })?;
        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.user }],
        });

        let response = self
            .http
            .post(self.messages_url())
            .json(&body)
            .send()
            .await
            .map_err(|error| CompletionError::Transport {
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|error| CompletionError::InvalidResponse {
                    reason: error.to_string(),
                })?;
        let text = parsed.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        });
        match text {
            Some(text) => {
                tracing::debug!(model = %self.config.model, "completion returned");
                Ok(text)
            }
            None => Err(CompletionError::InvalidResponse {
                reason: "response carried no text content block".to_string(),
            }),
        }
    }
}
