use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use relay_config::CircuitBreakerConfig;
use serde::Serialize;

/// Breaker thresholds shared by every backend
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive failures while closed before opening
    pub failure_threshold: u32,
    /// Successes while half-open before closing
    pub success_threshold: u32,
    /// Weight of a model error or unclassified failure
    pub hard_failure_weight: u32,
    /// How long an open breaker blocks traffic
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            hard_failure_weight: 2,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl TryFrom<&CircuitBreakerConfig> for BreakerSettings {
    type Error = anyhow::Error;

    fn try_from(config: &CircuitBreakerConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            hard_failure_weight: config.hard_failure_weight.max(1),
            cooldown: config.cooldown()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    transitioned_at: Instant,
}

impl BreakerInner {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.transitioned_at = Instant::now();
    }
}

/// Failure gate for a single backend
///
/// All transitions happen under one lock, so concurrent callers observe
/// them in a single order.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                transitioned_at: Instant::now(),
            }),
        }
    }

    /// Backend this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether traffic to the backend is currently blocked
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open and
    /// lets the caller through as a probe.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.state != CircuitState::Open {
            return false;
        }

        if inner.transitioned_at.elapsed() < self.settings.cooldown {
            return true;
        }

        inner.transition(CircuitState::HalfOpen);
        inner.success_count = 0;
        tracing::info!(backend = %self.name, "circuit breaker half-open, allowing probe");
        false
    }

    /// Record a failed call
    ///
    /// Returns `true` when this failure opened the breaker.
    pub fn record_failure(&self) -> bool {
        self.record_weighted_failure(1)
    }

    /// Record a model error or unclassified failure, which counts
    /// `hard_failure_weight` toward the threshold
    pub fn record_hard_failure(&self) -> bool {
        self.record_weighted_failure(self.settings.hard_failure_weight)
    }

    fn record_weighted_failure(&self, weight: u32) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.failure_count = inner.failure_count.saturating_add(weight.max(1));

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.settings.failure_threshold => {
                inner.transition(CircuitState::Open);
                true
            }
            // Failed probe
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Open);
                inner.success_count = 0;
                true
            }
            CircuitState::Closed | CircuitState::Open => false,
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.settings.success_threshold {
                    inner.transition(CircuitState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    tracing::info!(backend = %self.name, "circuit breaker closed");
                }
            }
            // Late result from a call that started before the breaker opened
            CircuitState::Open => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }
}

/// Breakers keyed by backend name, created on first use
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `name`, creating a closed one if none exists
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }

        let entry = self
            .breakers
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.settings)));
        Arc::clone(entry.value())
    }

    /// Snapshot of an existing breaker without creating one
    pub fn snapshot(&self, name: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(name).map(|b| b.snapshot())
    }

    pub const fn settings(&self) -> BreakerSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 3,
            success_threshold: 2,
            hard_failure_weight: 2,
            cooldown: Duration::from_secs(30),
        }
    }

    fn open(breaker: &CircuitBreaker) {
        for _ in 0..breaker.settings.failure_threshold {
            breaker.record_failure();
        }
    }

    fn expire_cooldown(breaker: &CircuitBreaker) {
        let mut inner = breaker.inner.lock().unwrap();
        inner.transitioned_at = Instant::now() - breaker.settings.cooldown - Duration::from_millis(1);
    }

    #[test]
    fn closed_breaker_allows_requests() {
        let breaker = CircuitBreaker::new("m", settings());
        assert!(!breaker.is_open());
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let breaker = CircuitBreaker::new("m", settings());

        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(!breaker.is_open());
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        assert_eq!(breaker.snapshot().failure_count, 3);
    }

    #[test]
    fn hard_failures_open_sooner() {
        let breaker = CircuitBreaker::new("m", settings());

        assert!(!breaker.record_hard_failure());
        assert_eq!(breaker.snapshot().failure_count, 2);
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
    }

    #[test]
    fn hard_failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        expire_cooldown(&breaker);
        assert!(!breaker.is_open());

        assert!(breaker.record_hard_failure());
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("m", settings());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();

        assert!(!breaker.is_open());
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[test]
    fn cooldown_moves_to_half_open() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        assert!(breaker.is_open());

        expire_cooldown(&breaker);

        assert!(!breaker.is_open());
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        expire_cooldown(&breaker);
        assert!(!breaker.is_open());

        breaker.record_success();
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
        breaker.record_success();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[test]
    fn failed_probe_reopens_with_fresh_cooldown() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        expire_cooldown(&breaker);
        assert!(!breaker.is_open());

        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn success_while_open_is_ignored() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);

        breaker.record_success();

        assert!(breaker.is_open());
        assert_eq!(breaker.snapshot().failure_count, 3);
    }

    #[test]
    fn failures_while_open_do_not_reopen() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        assert!(!breaker.record_failure());
    }

    #[test]
    fn snapshot_does_not_transition() {
        let breaker = CircuitBreaker::new("m", settings());
        open(&breaker);
        expire_cooldown(&breaker);

        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn registry_returns_shared_breaker() {
        let registry = BreakerRegistry::new(settings());

        let first = registry.get("gemini-2.5-pro");
        let second = registry.get("gemini-2.5-pro");
        assert!(Arc::ptr_eq(&first, &second));

        open(&first);
        assert!(second.is_open());
        assert!(!registry.get("gemini-2.5-flash").is_open());
    }

    #[test]
    fn registry_snapshot_does_not_create() {
        let registry = BreakerRegistry::new(settings());
        assert!(registry.snapshot("unknown").is_none());

        registry.get("known");
        assert_eq!(
            registry.snapshot("known").map(|s| s.state),
            Some(CircuitState::Closed)
        );
    }

    #[test]
    fn concurrent_failures_open_once() {
        let breaker = Arc::new(CircuitBreaker::new("m", settings()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || breaker.record_failure())
            })
            .collect();

        let opened = handles.into_iter().map(|h| h.join().unwrap()).filter(|o| *o).count();

        assert_eq!(opened, 1);
        assert!(breaker.is_open());
    }
}
