//! Metric names emitted by the routing gateway

/// Latency of a single backend attempt, in seconds
pub const ATTEMPT_DURATION: &str = "relay.attempt.duration";
/// Backend attempts, tagged with backend and outcome
pub const ATTEMPT_COUNT: &str = "relay.attempt.count";
/// Prompt and completion tokens of successful calls
pub const TOKEN_USAGE: &str = "relay.token.usage";
/// Cost of successful calls, in currency units
pub const REQUEST_COST: &str = "relay.request.cost";
/// Moves from one chain member to the next
pub const FALLBACK_COUNT: &str = "relay.fallback.count";
/// Circuit breaker transitions into the open state
pub const BREAKER_OPENED: &str = "relay.breaker.opened";

// Attribute keys
pub const BACKEND: &str = "relay.backend";
pub const OUTCOME: &str = "relay.outcome";
pub const TOKEN_TYPE: &str = "relay.token.type";
pub const FALLBACK_FROM: &str = "relay.fallback.from";
pub const FALLBACK_TO: &str = "relay.fallback.to";
