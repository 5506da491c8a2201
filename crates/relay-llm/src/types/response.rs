use std::time::Duration;

use serde::Serialize;

use super::tool::FunctionCall;
use crate::error::FailureKind;

/// Token counts reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub const fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Usage and cost of the call that produced a response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Cost in currency units
    pub cost: f64,
    /// Backend that served the call
    pub backend: String,
}

/// Successful result of a single backend call
#[derive(Debug, Clone)]
pub struct BackendReply {
    /// Concatenated text parts; empty when the reply is only function calls
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
    pub usage: Option<TokenUsage>,
    /// Decoded response body as returned by the backend
    pub raw: serde_json::Value,
}

impl BackendReply {
    /// Text-only reply, mostly useful for scripted backends
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            function_calls: Vec::new(),
            usage: None,
            raw: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed(FailureKind),
}

impl AttemptOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

/// One backend call made while serving a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub backend: String,
    pub outcome: AttemptOutcome,
    #[serde(serialize_with = "serialize_millis", rename = "latency_ms")]
    pub latency: Duration,
    /// Error message for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the router did for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Attempts in the order they were made
    pub attempts: Vec<AttemptRecord>,
    /// Backends passed over because their breaker was open
    pub skipped: Vec<String>,
}

impl Diagnostics {
    /// Backends that were actually called, in order
    pub fn attempted(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.backend.as_str()).collect()
    }
}

/// Uniform result returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct RouterResponse {
    pub text: String,
    pub backend_used: String,
    pub raw_response: serde_json::Value,
    pub usage: UsageRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    pub diagnostics: Diagnostics,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX))
}
