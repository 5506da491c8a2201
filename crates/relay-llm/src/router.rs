//! Tier-based routing with circuit breaking and bounded fallback

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use relay_config::LlmConfig;

use crate::assemble::RequestAssembler;
use crate::breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker};
use crate::context::{MessageRequest, RequestContext};
use crate::error::{BackendError, FailureKind, RouterError, classify};
use crate::guard::CostDepthGuard;
use crate::history::sanitize_history;
use crate::metrics::MetricsSink;
use crate::protocol::google::GoogleRequest;
use crate::provider::Backend;
use crate::provider::google::GoogleBackend;
use crate::secondary::SecondaryProviderClient;
use crate::session::ChatSession;
use crate::tier::{ChainResolver, ServiceTier};
use crate::types::{AttemptOutcome, AttemptRecord, BackendReply, Diagnostics, RouterResponse, ToolDeclaration, ToolSet};
use crate::usage::{PriceTable, UsageAccountant};

/// Prefix on the secondary provider's key in [`ModelRouter::health_check`]
pub const SECONDARY_HEALTH_PREFIX: &str = "secondary:";

/// Routes messages across backend chains
///
/// Cheap to clone; clones share breakers, tools, and the secondary handle.
#[derive(Clone)]
pub struct ModelRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    backend: Arc<dyn Backend>,
    chains: ChainResolver,
    breakers: BreakerRegistry,
    guard: CostDepthGuard,
    assembler: RequestAssembler,
    accountant: UsageAccountant,
    secondary: SecondaryProviderClient,
    metrics: Arc<dyn MetricsSink>,
    tools: RwLock<Arc<ToolSet>>,
    attempt_timeout: Duration,
}

impl ModelRouter {
    /// Build a router with the Google transport and the configured secondary
    ///
    /// # Errors
    ///
    /// Returns an error if a configured duration cannot be parsed
    pub fn from_config(config: &LlmConfig, metrics: Arc<dyn MetricsSink>) -> anyhow::Result<Self> {
        let backend = Arc::new(GoogleBackend::new(&config.primary));
        let secondary = SecondaryProviderClient::from_config(config.secondary.as_ref());

        Self::new(config, backend, secondary, metrics)
    }

    /// Build a router around an existing primary transport
    ///
    /// # Errors
    ///
    /// Returns an error if a configured duration cannot be parsed
    pub fn new(
        config: &LlmConfig,
        backend: Arc<dyn Backend>,
        secondary: SecondaryProviderClient,
        metrics: Arc<dyn MetricsSink>,
    ) -> anyhow::Result<Self> {
        let settings = BreakerSettings::try_from(&config.circuit_breaker)?;
        let attempt_timeout = config.generation.attempt_timeout()?;

        tracing::debug!(
            backend = backend.name(),
            pro = %config.tiers.pro,
            flash = %config.tiers.flash,
            fallback = %config.tiers.fallback,
            secondary = secondary.model().unwrap_or("none"),
            "model router configured"
        );

        Ok(Self {
            inner: Arc::new(RouterInner {
                backend,
                chains: ChainResolver::new(&config.tiers),
                breakers: BreakerRegistry::new(settings),
                guard: CostDepthGuard::new(config.guard.cost_ceiling),
                assembler: RequestAssembler::from_config(&config.generation),
                accountant: UsageAccountant::new(PriceTable::new(&config.pricing), Arc::clone(&metrics)),
                secondary,
                metrics,
                tools: RwLock::new(Arc::new(ToolSet::default())),
                attempt_timeout,
            }),
        })
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.inner.breakers
    }

    pub fn chains(&self) -> &ChainResolver {
        &self.inner.chains
    }

    pub fn secondary(&self) -> &SecondaryProviderClient {
        &self.inner.secondary
    }

    /// Replace the registered tool declarations
    ///
    /// Requests already in flight keep the set they started with.
    pub fn set_tools(&self, declarations: Vec<ToolDeclaration>) {
        let tools = Arc::new(ToolSet::new(declarations));
        tracing::info!(count = tools.len(), "tool set updated");
        *self.inner.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
    }

    /// Current tool set snapshot
    pub fn tools(&self) -> Arc<ToolSet> {
        Arc::clone(&self.inner.tools.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Send a message through the tier's fallback chain
    ///
    /// Never reaches the secondary provider; see
    /// [`Self::send_message_with_secondary`].
    ///
    /// # Errors
    ///
    /// Returns `RouterError::InvalidRequest` when there is nothing to send and
    /// `RouterError::AllBackendsFailed` when no chain member produced a reply
    pub async fn send_message(&self, request: MessageRequest) -> Result<RouterResponse, RouterError> {
        let mut ctx = self.prepare(request)?;
        self.search_chain(&mut ctx).await
    }

    /// Send through the chain, then once through the secondary provider if
    /// every chain member failed
    ///
    /// # Errors
    ///
    /// Returns `RouterError::SecondaryUnavailable` when the secondary cannot
    /// be constructed and `RouterError::SecondaryFailed` when its call fails
    pub async fn send_message_with_secondary(&self, request: MessageRequest) -> Result<RouterResponse, RouterError> {
        let mut ctx = self.prepare(request)?;

        let diagnostics = match self.search_chain(&mut ctx).await {
            Err(RouterError::AllBackendsFailed { tier, diagnostics, .. }) => {
                tracing::warn!(%tier, "primary chain exhausted, trying secondary provider");
                diagnostics
            }
            other => return other,
        };

        self.call_secondary(&ctx, diagnostics).await
    }

    /// Start a conversation on the first healthy backend of `tier`
    ///
    /// Malformed history entries are dropped. Returns `None` when every
    /// backend in the chain has an open breaker.
    pub fn create_chat_with_history(&self, history: &serde_json::Value, tier: ServiceTier) -> Option<ChatSession> {
        let history = sanitize_history(history);
        let chain = self.inner.chains.resolve(tier);

        let Some(backend) = chain.iter().find(|name| !self.inner.breakers.get(name).is_open()) else {
            tracing::warn!(%tier, "no backend available for chat session");
            return None;
        };

        if chain.first() != Some(backend) {
            tracing::debug!(%tier, backend = %backend, "chat session starting on a fallback backend");
        }

        Some(ChatSession::new(tier, backend.clone(), history))
    }

    /// Send the next message of a session and record the exchange
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_message`]; the session is unchanged on error
    pub async fn continue_chat(
        &self,
        session: &mut ChatSession,
        message: impl Into<String>,
    ) -> Result<RouterResponse, RouterError> {
        let message = message.into();
        let request = MessageRequest::new(message.clone(), session.tier()).with_history(session.history().to_vec());

        let response = self.send_message(request).await?;
        session.record_exchange(message, response.text.clone(), &response.backend_used);

        Ok(response)
    }

    /// Probe every chain backend and the secondary provider
    ///
    /// Probes run concurrently and never touch breaker state. The secondary
    /// is keyed as `secondary:<model>` so it never shadows a chain backend.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let probe = Arc::new(self.inner.assembler.probe());

        let mut probes: Vec<_> = self
            .inner
            .chains
            .distinct_backends()
            .into_iter()
            .map(|name| {
                let inner = Arc::clone(&self.inner);
                let probe = Arc::clone(&probe);
                let model = name.clone();
                (name, tokio::spawn(async move { inner.probe_primary(&model, &probe).await }))
            })
            .collect();

        if let Some(model) = self.inner.secondary.model() {
            let inner = Arc::clone(&self.inner);
            probes.push((
                format!("{SECONDARY_HEALTH_PREFIX}{model}"),
                tokio::spawn(async move { inner.probe_secondary().await }),
            ));
        }

        let mut results = BTreeMap::new();
        for (name, handle) in probes {
            let healthy = handle.await.unwrap_or_else(|e| {
                tracing::error!(backend = %name, error = %e, "health probe panicked");
                false
            });
            results.insert(name, healthy);
        }

        results
    }

    fn prepare(&self, request: MessageRequest) -> Result<RequestContext, RouterError> {
        let chain_len = self.inner.chains.resolve(request.tier).len();
        let images = RequestAssembler::decode_images(&request.images);
        let tools = request.enable_tools.then(|| self.tools());

        let ctx = RequestContext::new(request.message, request.tier, chain_len)
            .with_history(request.history)
            .with_images(images, request.images.len())
            .with_tools(tools);

        RequestAssembler::validate(&ctx)?;
        Ok(ctx)
    }

    async fn search_chain(&self, ctx: &mut RequestContext) -> Result<RouterResponse, RouterError> {
        let inner = &*self.inner;
        let mut diagnostics = Diagnostics::default();
        let mut failed_from: Option<&str> = None;

        for backend in inner.chains.resolve(ctx.tier) {
            let breaker = inner.breakers.get(backend);
            if breaker.is_open() {
                tracing::debug!(backend = %backend, "circuit open, skipping backend");
                diagnostics.skipped.push(backend.clone());
                continue;
            }

            if let Err(refusal) = inner.guard.check(ctx) {
                tracing::warn!(backend = %backend, %refusal, "guard stopped the fallback search");
                return Err(RouterError::AllBackendsFailed {
                    tier: ctx.tier,
                    diagnostics,
                    refusal: Some(refusal),
                });
            }

            let payload = inner.assembler.assemble(ctx)?;

            if let Some(from) = failed_from.take() {
                inner.accountant.record_fallback(from, backend);
            }

            ctx.record_attempt();
            let started = Instant::now();
            let result = inner.call_primary(backend, &payload).await;
            let latency = started.elapsed();

            match result {
                Ok(reply) => {
                    breaker.record_success();
                    inner.metrics.attempt(backend, AttemptOutcome::Success, latency);
                    diagnostics.attempts.push(AttemptRecord {
                        backend: backend.clone(),
                        outcome: AttemptOutcome::Success,
                        latency,
                        error: None,
                    });

                    return Ok(inner.respond(backend, reply, diagnostics));
                }
                Err(error) => {
                    let kind = inner.record_failure(backend, &breaker, &error, latency);
                    ctx.charge(inner.accountant.cost(backend, error.usage()));

                    diagnostics.attempts.push(AttemptRecord {
                        backend: backend.clone(),
                        outcome: AttemptOutcome::Failed(kind),
                        latency,
                        error: Some(error.to_string()),
                    });
                    failed_from = Some(backend);
                }
            }
        }

        tracing::warn!(
            tier = %ctx.tier,
            attempts = diagnostics.attempts.len(),
            skipped = diagnostics.skipped.len(),
            "all backends failed"
        );

        Err(RouterError::AllBackendsFailed {
            tier: ctx.tier,
            diagnostics,
            refusal: None,
        })
    }

    async fn call_secondary(
        &self,
        ctx: &RequestContext,
        mut diagnostics: Diagnostics,
    ) -> Result<RouterResponse, RouterError> {
        let inner = &*self.inner;
        let secondary = inner.secondary.get().await?;
        let model = secondary.model().to_owned();
        let payload = inner
            .assembler
            .assemble_secondary(ctx, &model, secondary.max_tokens())?;

        if let Some(last) = diagnostics.attempts.last() {
            inner.accountant.record_fallback(&last.backend, &model);
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(inner.attempt_timeout, secondary.generate(&payload)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(inner.attempt_timeout)),
        };
        let latency = started.elapsed();

        match result {
            Ok(reply) => {
                inner.metrics.attempt(&model, AttemptOutcome::Success, latency);
                diagnostics.attempts.push(AttemptRecord {
                    backend: model.clone(),
                    outcome: AttemptOutcome::Success,
                    latency,
                    error: None,
                });

                Ok(inner.respond(&model, reply, diagnostics))
            }
            Err(error) => {
                let kind = classify(&error);
                tracing::error!(model = %model, kind = kind.as_str(), error = %error, "secondary provider call failed");
                inner.metrics.attempt(&model, AttemptOutcome::Failed(kind), latency);
                Err(RouterError::SecondaryFailed(error))
            }
        }
    }
}

impl RouterInner {
    async fn call_primary(&self, model: &str, payload: &GoogleRequest) -> Result<BackendReply, BackendError> {
        match tokio::time::timeout(self.attempt_timeout, self.backend.generate(model, payload)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.attempt_timeout)),
        }
    }

    /// Classify a failed attempt and report it to the breaker and metrics
    fn record_failure(
        &self,
        backend: &str,
        breaker: &CircuitBreaker,
        error: &BackendError,
        latency: Duration,
    ) -> FailureKind {
        let kind = classify(error);

        if kind.is_hard() {
            tracing::error!(backend, kind = kind.as_str(), error = %error, "backend call failed");
        } else {
            tracing::warn!(backend, kind = kind.as_str(), error = %error, "backend call failed");
        }

        let opened = if kind.is_hard() {
            breaker.record_hard_failure()
        } else {
            breaker.record_failure()
        };
        if opened {
            tracing::warn!(backend, "circuit breaker opened");
            self.metrics.breaker_opened(backend);
        }

        self.metrics.attempt(backend, AttemptOutcome::Failed(kind), latency);
        kind
    }

    fn respond(&self, backend: &str, reply: BackendReply, diagnostics: Diagnostics) -> RouterResponse {
        let usage = self.accountant.account(backend, reply.usage);

        tracing::debug!(
            backend,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost = usage.cost,
            "request served"
        );

        RouterResponse {
            text: reply.text,
            backend_used: backend.to_owned(),
            raw_response: reply.raw,
            usage,
            function_calls: reply.function_calls,
            diagnostics,
        }
    }

    async fn probe_primary(&self, model: &str, probe: &GoogleRequest) -> bool {
        match self.call_primary(model, probe).await {
            // The backend answered; a one-token probe often yields no text
            Ok(_) | Err(BackendError::EmptyResponse { .. } | BackendError::Blocked { .. }) => true,
            Err(error) => {
                tracing::warn!(backend = model, error = %error, "health probe failed");
                false
            }
        }
    }

    async fn probe_secondary(&self) -> bool {
        let secondary = match self.secondary.get().await {
            Ok(secondary) => secondary,
            Err(error) => {
                tracing::warn!(error = %error, "secondary health probe skipped");
                return false;
            }
        };

        let probe = RequestAssembler::secondary_probe(secondary.model());
        let result = match tokio::time::timeout(self.attempt_timeout, secondary.generate(&probe)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.attempt_timeout)),
        };

        match result {
            Ok(_) | Err(BackendError::EmptyResponse { .. } | BackendError::Blocked { .. }) => true,
            Err(error) => {
                tracing::warn!(model = secondary.model(), error = %error, "secondary health probe failed");
                false
            }
        }
    }
}
