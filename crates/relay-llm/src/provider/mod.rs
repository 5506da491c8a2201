//! Transports for the two backend families

pub mod anthropic;
pub mod google;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::google::GoogleRequest;
use crate::types::BackendReply;

/// Primary backend family, addressed by model name
#[async_trait]
pub trait Backend: Send + Sync {
    /// Family name used in logs
    fn name(&self) -> &str;

    /// Run one generation against `model`
    async fn generate(&self, model: &str, request: &GoogleRequest) -> Result<BackendReply, BackendError>;
}

/// Secondary backend family, bound to a single model
#[async_trait]
pub trait SecondaryBackend: Send + Sync {
    fn model(&self) -> &str;

    /// Upper bound on generated tokens for this provider
    fn max_tokens(&self) -> u32;

    async fn generate(&self, request: &AnthropicRequest) -> Result<BackendReply, BackendError>;
}

/// Shorten an error body for inclusion in a message
fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;

    let body = body.trim();
    match body.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_owned(),
    }
}
