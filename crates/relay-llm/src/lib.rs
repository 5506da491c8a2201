//! Resilient model routing
//!
//! A [`ModelRouter`] sends each message through an ordered chain of
//! interchangeable backends chosen by [`ServiceTier`]. Backends with an open
//! circuit breaker are skipped, and a per-request cost and depth guard
//! bounds the fallback search. A secondary provider family is reachable
//! only through [`ModelRouter::send_message_with_secondary`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod assemble;
pub mod breaker;
pub mod context;
pub mod error;
pub mod guard;
pub mod history;
pub mod metrics;
pub mod protocol;
pub mod provider;
mod router;
pub mod secondary;
mod session;
pub mod tier;
pub mod types;
pub mod usage;

pub use breaker::{BreakerRegistry, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use context::{MessageRequest, RequestContext};
pub use error::{AssembleError, BackendError, FailureKind, ModelErrorKind, RouterError, classify};
pub use guard::{CostDepthGuard, GuardRefusal};
pub use metrics::{MetricsSink, NoopMetrics, OtelMetrics};
pub use provider::{Backend, SecondaryBackend};
pub use router::{ModelRouter, SECONDARY_HEALTH_PREFIX};
pub use secondary::{SecondaryProviderClient, SecondaryStatus};
pub use session::ChatSession;
pub use tier::{ChainResolver, ServiceTier};
pub use types::{
    AttemptOutcome, AttemptRecord, BackendReply, ChatTurn, Diagnostics, FunctionCall, ImageInput, Role, RouterResponse,
    TokenUsage, ToolDeclaration, ToolSet, UsageRecord,
};
