//! Google Generative Language API transport

use async_trait::async_trait;
use relay_config::PrimaryProviderConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Backend, truncate_body};
use crate::error::BackendError;
use crate::protocol::google::{GoogleErrorResponse, GoogleRequest, GoogleResponse};
use crate::types::{BackendReply, FunctionCall, TokenUsage};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the candidate was withheld
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

/// `generateContent` client
pub struct GoogleBackend {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl GoogleBackend {
    /// Create from provider configuration
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(config: &PrimaryProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Self {
            client: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
        }
    }

    fn generate_url(&self, model: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:generateContent")
    }
}

#[async_trait]
impl Backend for GoogleBackend {
    fn name(&self) -> &str {
        "google"
    }

    async fn generate(&self, model: &str, request: &GoogleRequest) -> Result<BackendReply, BackendError> {
        let mut builder = self.client.post(self.generate_url(model)).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(model, error = %e, "google request failed");
            BackendError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        reply_from_body(raw)
    }
}

/// Map a non-success response to a [`BackendError`]
fn status_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(parsed) => BackendError::Status {
            status,
            reason: parsed.error.status,
            message: parsed.error.message,
        },
        Err(_) => BackendError::Status {
            status,
            reason: body.contains("RESOURCE_EXHAUSTED").then(|| "RESOURCE_EXHAUSTED".to_owned()),
            message: truncate_body(body),
        },
    }
}

/// Interpret a successful `generateContent` body
fn reply_from_body(raw: serde_json::Value) -> Result<BackendReply, BackendError> {
    let response: GoogleResponse =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::Decode(e.to_string()))?;

    let usage = response.usage_metadata.map(|u| TokenUsage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count + u.thoughts_token_count,
    });

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::Blocked { reason, usage });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(BackendError::EmptyResponse { usage });
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    if parts.is_empty()
        && let Some(reason) = candidate
            .finish_reason
            .filter(|r| BLOCKING_FINISH_REASONS.contains(&r.as_str()))
    {
        return Err(BackendError::Blocked { reason, usage });
    }

    let mut text = String::new();
    let mut function_calls = Vec::new();

    for part in parts {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
        if let Some(call) = part.function_call {
            function_calls.push(FunctionCall {
                name: call.name,
                args: call.args,
            });
        }
    }

    if text.is_empty() && function_calls.is_empty() {
        return Err(BackendError::EmptyResponse { usage });
    }

    Ok(BackendReply {
        text,
        function_calls,
        usage,
        raw,
    })
}
