//! Anthropic Messages API transport for the secondary provider

use async_trait::async_trait;
use relay_config::SecondaryProviderConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{SecondaryBackend, truncate_body};
use crate::error::BackendError;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock};
use crate::types::{BackendReply, FunctionCall, TokenUsage};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client bound to one model
pub struct AnthropicBackend {
    client: Client,
    base_url: Url,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns a reason string when no usable API key is configured or the
    /// default base URL cannot be parsed
    pub fn new(config: &SecondaryProviderConfig) -> Result<Self, String> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| "no API key configured".to_owned())?;

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| format!("invalid base URL: {e}"))?,
        };

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }
}

#[async_trait]
impl SecondaryBackend for AnthropicBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    async fn generate(&self, request: &AnthropicRequest) -> Result<BackendReply, BackendError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(model = %self.model, error = %e, "anthropic request failed");
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

fn status_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<AnthropicErrorResponse>(body) {
        Ok(parsed) => BackendError::Status {
            status,
            reason: Some(parsed.error.error_type),
            message: parsed.error.message,
        },
        Err(_) => BackendError::Status {
            status,
            reason: None,
            message: truncate_body(body),
        },
    }
}

fn reply_from_body(raw: serde_json::Value) -> Result<BackendReply, BackendError> {
    let response: AnthropicResponse =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::Decode(e.to_string()))?;

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));

    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(BackendError::Blocked {
            reason: "refusal".to_owned(),
            usage,
        });
    }

    let mut text = String::new();
    let mut function_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text: chunk } => text.push_str(&chunk),
            AnthropicResponseBlock::ToolUse { name, input } => function_calls.push(FunctionCall { name, args: input }),
            AnthropicResponseBlock::Unknown => {}
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(api_key: Option<&str>) -> SecondaryProviderConfig {
        SecondaryProviderConfig {
            model: "claude-sonnet-4".to_owned(),
            api_key: api_key.map(SecretString::from),
            base_url: None,
            max_tokens: 1024,
        }
    }

    #[test]
    fn missing_or_blank_key_is_rejected() {
        assert!(AnthropicBackend::new(&config(None)).is_err());
        assert!(AnthropicBackend::new(&config(Some("  "))).is_err());

        let backend = AnthropicBackend::new(&config(Some("sk-test"))).unwrap();
        assert_eq!(backend.model(), "claude-sonnet-4");
        assert_eq!(backend.messages_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn text_and_tool_use_blocks() {
        let reply = reply_from_body(json!({
            "content": [
                { "type": "text", "text": "Looking it up" },
                { "type": "tool_use", "id": "toolu_1", "name": "search_catalog", "input": { "q": "boots" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 8 }
        }))
        .unwrap();

        assert_eq!(reply.text, "Looking it up");
        assert_eq!(reply.function_calls[0].name, "search_catalog");
        assert_eq!(reply.usage, Some(TokenUsage::new(12, 8)));
    }

    #[test]
    fn refusal_is_blocked() {
        let err = reply_from_body(json!({
            "content": [],
            "stop_reason": "refusal",
            "usage": { "input_tokens": 5, "output_tokens": 0 }
        }))
        .unwrap_err();

        assert!(matches!(err, BackendError::Blocked { .. }));
    }

    #[test]
    fn overloaded_status_keeps_error_type() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;

        match status_error(529, body) {
            BackendError::Status { status, reason, .. } => {
                assert_eq!(status, 529);
                assert_eq!(reason.as_deref(), Some("overloaded_error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
