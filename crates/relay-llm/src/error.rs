use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::guard::GuardRefusal;
use crate::tier::ServiceTier;
use crate::types::{Diagnostics, TokenUsage};

/// Failure of a single backend call
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Backend answered with a non-success HTTP status
    #[error("backend returned {status}: {message}")]
    Status {
        status: u16,
        /// Provider status string such as `RESOURCE_EXHAUSTED`, when present
        reason: Option<String>,
        message: String,
    },

    /// Connection could not be established or was interrupted
    #[error("transport error: {0}")]
    Transport(String),

    /// The attempt did not finish within its timeout
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Content was withheld by a safety filter
    #[error("response blocked: {reason}")]
    Blocked { reason: String, usage: Option<TokenUsage> },

    /// Backend produced no candidates
    #[error("backend returned no content")]
    EmptyResponse { usage: Option<TokenUsage> },

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Token usage reported alongside the failure, if any
    pub const fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Self::Blocked { usage, .. } | Self::EmptyResponse { usage } => usage.as_ref(),
            _ => None,
        }
    }
}

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limit or quota hit
    QuotaExhausted,
    /// Backend overloaded, unreachable, or too slow
    ServiceUnavailable,
    /// Backend rejected or mangled this particular request
    ModelError(ModelErrorKind),
    Unclassified,
}

impl FailureKind {
    /// Whether the failure is logged at error level and weighted in the breaker
    pub const fn is_hard(self) -> bool {
        matches!(self, Self::ModelError(_) | Self::Unclassified)
    }

    /// Short label used in logs and metric attributes
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ModelError(_) => "model_error",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Sub-kind of [`FailureKind::ModelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    InvalidRequest,
    NotFound,
    PermissionDenied,
    Blocked,
    EmptyResponse,
    MalformedResponse,
}

/// Classify a backend failure
pub fn classify(error: &BackendError) -> FailureKind {
    match error {
        BackendError::Status { status: 429, .. } => FailureKind::QuotaExhausted,
        BackendError::Status { reason: Some(reason), .. } if reason == "RESOURCE_EXHAUSTED" => {
            FailureKind::QuotaExhausted
        }
        // 529 is the Anthropic "overloaded" status
        BackendError::Status {
            status: 500 | 502 | 503 | 504 | 529,
            ..
        }
        | BackendError::Transport(_)
        | BackendError::Timeout(_) => FailureKind::ServiceUnavailable,
        BackendError::Status { status: 404, .. } => FailureKind::ModelError(ModelErrorKind::NotFound),
        BackendError::Status { status: 401 | 403, .. } => FailureKind::ModelError(ModelErrorKind::PermissionDenied),
        BackendError::Status { status: 400..=499, .. } => FailureKind::ModelError(ModelErrorKind::InvalidRequest),
        BackendError::Blocked { .. } => FailureKind::ModelError(ModelErrorKind::Blocked),
        BackendError::EmptyResponse { .. } => FailureKind::ModelError(ModelErrorKind::EmptyResponse),
        BackendError::Decode(_) => FailureKind::ModelError(ModelErrorKind::MalformedResponse),
        BackendError::Status { .. } | BackendError::Other(_) => FailureKind::Unclassified,
    }
}

/// Payload could not be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("message is empty and no images were supplied")]
    MissingMessage,
}

/// Terminal outcome of a routed request
#[derive(Debug, Error)]
pub enum RouterError {
    /// Every chain member was skipped, failed, or refused by the guard
    #[error("all backends failed for tier {tier}")]
    AllBackendsFailed {
        tier: ServiceTier,
        diagnostics: Diagnostics,
        /// Set when the guard ended the search early
        refusal: Option<GuardRefusal>,
    },

    /// Secondary provider could not be constructed
    #[error("secondary provider unavailable: {0}")]
    SecondaryUnavailable(String),

    /// Secondary provider was reached but the call failed
    #[error("secondary provider failed: {0}")]
    SecondaryFailed(BackendError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] AssembleError),
}
