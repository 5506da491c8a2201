//! Lazily constructed secondary provider

use std::sync::Arc;

use relay_config::SecondaryProviderConfig;
use tokio::sync::OnceCell;

use crate::error::RouterError;
use crate::provider::SecondaryBackend;
use crate::provider::anthropic::AnthropicBackend;

type Factory = Box<dyn Fn() -> Result<Arc<dyn SecondaryBackend>, String> + Send + Sync>;

/// Observable state of the secondary handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryStatus {
    /// No caller has needed the secondary yet
    Uninitialized,
    Ready,
    /// Construction failed; it is never retried
    Failed,
}

enum Handle {
    Ready(Arc<dyn SecondaryBackend>),
    Failed(String),
}

/// Secondary provider built on first use and cached for the router's lifetime
pub struct SecondaryProviderClient {
    model: Option<String>,
    factory: Factory,
    handle: OnceCell<Handle>,
}

impl SecondaryProviderClient {
    /// Client whose backend is produced by `factory` on first use
    pub fn new<F>(model: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SecondaryBackend>, String> + Send + Sync + 'static,
    {
        Self {
            model: Some(model.into()),
            factory: Box::new(factory),
            handle: OnceCell::new(),
        }
    }

    /// No secondary provider configured
    pub fn disabled() -> Self {
        Self {
            model: None,
            factory: Box::new(|| Err("no secondary provider configured".to_owned())),
            handle: OnceCell::new(),
        }
    }

    /// Anthropic client built from configuration, or disabled when absent
    pub fn from_config(config: Option<&SecondaryProviderConfig>) -> Self {
        let Some(config) = config else {
            return Self::disabled();
        };

        let config = config.clone();
        Self::new(config.model.clone(), move || {
            AnthropicBackend::new(&config).map(|b| Arc::new(b) as Arc<dyn SecondaryBackend>)
        })
    }

    /// Configured model name, used as the health-check key
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn status(&self) -> SecondaryStatus {
        match self.handle.get() {
            None => SecondaryStatus::Uninitialized,
            Some(Handle::Ready(_)) => SecondaryStatus::Ready,
            Some(Handle::Failed(_)) => SecondaryStatus::Failed,
        }
    }

    /// Backend handle, constructing it on the first call
    ///
    /// # Errors
    ///
    /// Returns `RouterError::SecondaryUnavailable` when construction failed,
    /// now or on an earlier call
    pub async fn get(&self) -> Result<Arc<dyn SecondaryBackend>, RouterError> {
        let handle = self
            .handle
            .get_or_init(|| async {
                match (self.factory)() {
                    Ok(backend) => {
                        tracing::info!(model = backend.model(), "secondary provider ready");
                        Handle::Ready(backend)
                    }
                    Err(reason) => {
                        tracing::warn!(reason = %reason, "secondary provider unavailable");
                        Handle::Failed(reason)
                    }
                }
            })
            .await;

        match handle {
            Handle::Ready(backend) => Ok(Arc::clone(backend)),
            Handle::Failed(reason) => Err(RouterError::SecondaryUnavailable(reason.clone())),
        }
    }
}
