//! Routing events reported to an observability backend

use std::time::Duration;

use relay_telemetry::metrics as names;
use relay_telemetry::{Counter, Histogram, KeyValue};

use crate::types::{AttemptOutcome, UsageRecord};

/// Receiver of routing events
///
/// Recording is synchronous and infallible so it can never change a
/// routing decision.
pub trait MetricsSink: Send + Sync {
    /// The router moved from a failed backend to the next one
    fn fallback(&self, from: &str, to: &str);

    /// A backend call finished
    fn attempt(&self, backend: &str, outcome: AttemptOutcome, latency: Duration);

    /// Usage of a successful call
    fn usage(&self, record: &UsageRecord);

    /// A breaker moved into the open state
    fn breaker_opened(&self, backend: &str);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn fallback(&self, _from: &str, _to: &str) {}

    fn attempt(&self, _backend: &str, _outcome: AttemptOutcome, _latency: Duration) {}

    fn usage(&self, _record: &UsageRecord) {}

    fn breaker_opened(&self, _backend: &str) {}
}

/// OpenTelemetry instruments on the global meter provider
pub struct OtelMetrics {
    attempt_duration: Histogram<f64>,
    attempt_count: Counter<u64>,
    token_usage: Histogram<u64>,
    request_cost: Histogram<f64>,
    fallback_count: Counter<u64>,
    breaker_opened: Counter<u64>,
}

impl OtelMetrics {
    pub fn new() -> Self {
        let meter = relay_telemetry::meter();

        Self {
            attempt_duration: meter
                .f64_histogram(names::ATTEMPT_DURATION)
                .with_unit("s")
                .with_description("Latency of a single backend attempt")
                .build(),
            attempt_count: meter
                .u64_counter(names::ATTEMPT_COUNT)
                .with_description("Backend attempts by outcome")
                .build(),
            token_usage: meter
                .u64_histogram(names::TOKEN_USAGE)
                .with_unit("{token}")
                .with_description("Prompt and completion tokens per successful call")
                .build(),
            request_cost: meter
                .f64_histogram(names::REQUEST_COST)
                .with_description("Cost of successful calls")
                .build(),
            fallback_count: meter
                .u64_counter(names::FALLBACK_COUNT)
                .with_description("Moves from a failed backend to the next chain member")
                .build(),
            breaker_opened: meter
                .u64_counter(names::BREAKER_OPENED)
                .with_description("Circuit breakers opened")
                .build(),
        }
    }
}

impl Default for OtelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for OtelMetrics {
    fn fallback(&self, from: &str, to: &str) {
        self.fallback_count.add(
            1,
            &[
                KeyValue::new(names::FALLBACK_FROM, from.to_owned()),
                KeyValue::new(names::FALLBACK_TO, to.to_owned()),
            ],
        );
    }

    fn attempt(&self, backend: &str, outcome: AttemptOutcome, latency: Duration) {
        let attrs = [
            KeyValue::new(names::BACKEND, backend.to_owned()),
            KeyValue::new(names::OUTCOME, outcome.as_str()),
        ];
        self.attempt_count.add(1, &attrs);
        self.attempt_duration.record(latency.as_secs_f64(), &attrs);
    }

    fn usage(&self, record: &UsageRecord) {
        let backend = KeyValue::new(names::BACKEND, record.backend.clone());

        self.token_usage.record(
            record.prompt_tokens,
            &[backend.clone(), KeyValue::new(names::TOKEN_TYPE, "prompt")],
        );
        self.token_usage.record(
            record.completion_tokens,
            &[backend.clone(), KeyValue::new(names::TOKEN_TYPE, "completion")],
        );
        self.request_cost.record(record.cost, &[backend]);
    }

    fn breaker_opened(&self, backend: &str) {
        self.breaker_opened
            .add(1, &[KeyValue::new(names::BACKEND, backend.to_owned())]);
    }
}
