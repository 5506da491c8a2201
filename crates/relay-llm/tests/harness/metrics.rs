//! Metrics sink that records every event for assertions

use std::sync::Mutex;
use std::time::Duration;

use relay_llm::{AttemptOutcome, MetricsSink, UsageRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fallback { from: String, to: String },
    Attempt { backend: String, outcome: AttemptOutcome },
    Usage(UsageRecord),
    BreakerOpened(String),
}

#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<Event>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn fallbacks(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Fallback { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    pub fn breakers_opened(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::BreakerOpened(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl MetricsSink for RecordingMetrics {
    fn fallback(&self, from: &str, to: &str) {
        self.push(Event::Fallback {
            from: from.to_owned(),
            to: to.to_owned(),
        });
    }

    fn attempt(&self, backend: &str, outcome: AttemptOutcome, _latency: Duration) {
        self.push(Event::Attempt {
            backend: backend.to_owned(),
            outcome,
        });
    }

    fn usage(&self, record: &UsageRecord) {
        self.push(Event::Usage(record.clone()));
    }

    fn breaker_opened(&self, backend: &str) {
        self.push(Event::BreakerOpened(backend.to_owned()));
    }
}
