//! Metrics sink for the intelligence pipeline
//!
//! Counters per request kind plus latency and token totals. The sink is
//! cheap, lock-guarded, and snapshottable; tests read it to assert retry
//! and fallback behavior without poking at internals.

use crate::kind::RequestKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct KindMetrics {
    pub requests: u64,
    pub successes: u64,
    pub fallbacks: u64,
    pub cache_hits: u64,
    pub dedup_hits: u64,
    pub retries: u64,
    pub validation_failures: u64,
    pub rate_limit_timeouts: u64,
    pub total_latency_ms: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub kinds: HashMap<String, KindMetrics>,
}

impl MetricsSnapshot {
    pub fn kind(&self, kind: RequestKind) -> KindMetrics {
        self.kinds.get(kind.label()).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct MetricsSink {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_kind(&self, kind: RequestKind, f: impl FnOnce(&mut KindMetrics)) {
        let mut snapshot = self.inner.lock().expect("metrics lock");
        f(snapshot.kinds.entry(kind.label().to_string()).or_default());
    }

    pub fn record_outcome(
        &self,
        kind: RequestKind,
        outcome: RequestOutcome,
        latency: Duration,
        tokens: usize,
    ) {
        self.with_kind(kind, |m| {
            m.requests += 1;
            match outcome {
                RequestOutcome::Success => m.successes += 1,
                RequestOutcome::Fallback => m.fallbacks += 1,
            }
            m.total_latency_ms += latency.as_millis() as u64;
            m.total_tokens += tokens as u64;
        });
    }

    pub fn record_cache_hit(&self, kind: RequestKind) {
        self.with_kind(kind, |m| m.cache_hits += 1);
    }

    pub fn record_dedup_hit(&self, kind: RequestKind) {
        self.with_kind(kind, |m| m.dedup_hits += 1);
    }

    pub fn record_retry(&self, kind: RequestKind) {
        self.with_kind(kind, |m| m.retries += 1);
    }

    pub fn record_validation_failure(&self, kind: RequestKind) {
        self.with_kind(kind, |m| m.validation_failures += 1);
    }

    pub fn record_rate_limit_timeout(&self, kind: RequestKind) {
        self.with_kind(kind, |m| m.rate_limit_timeouts += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().expect("metrics lock").clone()
    }
}
