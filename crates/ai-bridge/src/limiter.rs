//! Token-bucket rate limiting, one global bucket plus one per kind
//!
//! A request that cannot take a token waits; a wait that outlives the
//! configured timeout elevates to fallback instead of queueing forever.

use crate::kind::RequestKind;
use crawler_core::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimeout;

struct Bucket {
    tokens: f64,
    burst: f64,
    per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(per_minute: u32) -> Self {
        let burst = per_minute.max(1) as f64;
        Self { tokens: burst, burst, per_second: burst / 60.0, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.burst);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until one token is available.
    fn wait_hint(&self) -> f64 {
        ((1.0 - self.tokens) / self.per_second).max(0.0)
    }
}

struct Buckets {
    global: Bucket,
    per_kind: HashMap<RequestKind, Bucket>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let per_kind = RequestKind::ALL
            .into_iter()
            .map(|k| (k, Bucket::new(config.per_kind_per_minute)))
            .collect();
        Self {
            buckets: Mutex::new(Buckets {
                global: Bucket::new(config.requests_per_minute),
                per_kind,
            }),
            config,
        }
    }

    /// Take one token from both buckets, waiting up to the configured
    /// timeout.
    pub async fn acquire(&self, kind: RequestKind) -> Result<(), WaitTimeout> {
        let deadline = Instant::now() + Duration::from_millis(self.config.wait_timeout_ms);
        loop {
            let wait_hint = {
                let mut guard = self.buckets.lock().expect("limiter lock");
                let Buckets { global, per_kind } = &mut *guard;
                let now = Instant::now();
                let kind_bucket = per_kind.get_mut(&kind).expect("bucket for every kind");
                kind_bucket.refill(now);
                if kind_bucket.tokens >= 1.0 && global.try_take(now) {
                    kind_bucket.tokens -= 1.0;
                    return Ok(());
                }
                global.wait_hint().max(kind_bucket.wait_hint())
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitTimeout);
            }
            let sleep_for = Duration::from_secs_f64(wait_hint.max(0.01))
                .min(deadline.duration_since(now));
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Immediate, non-waiting probe. Prefetchers use this to shed load
    /// instead of queueing behind the bucket.
    pub fn try_acquire(&self, kind: RequestKind) -> bool {
        let mut guard = self.buckets.lock().expect("limiter lock");
        let Buckets { global, per_kind } = &mut *guard;
        let now = Instant::now();
        let kind_bucket = per_kind.get_mut(&kind).expect("bucket for every kind");
        kind_bucket.refill(now);
        if kind_bucket.tokens >= 1.0 && global.try_take(now) {
            kind_bucket.tokens -= 1.0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig { requests_per_minute: 2, per_kind_per_minute: 2, wait_timeout_ms: 50 }
    }

    #[tokio::test]
    async fn test_burst_then_timeout() {
        let limiter = RateLimiter::new(tight_config());
        assert!(limiter.acquire(RequestKind::NpcDialogue).await.is_ok());
        assert!(limiter.acquire(RequestKind::NpcDialogue).await.is_ok());
        // bucket drained; the 50ms wait cannot cover a 30s refill
        assert_eq!(limiter.acquire(RequestKind::NpcDialogue).await, Err(WaitTimeout));
    }

    #[tokio::test]
    async fn test_per_kind_buckets_are_independent() {
        let config = RateLimitConfig {
            requests_per_minute: 100,
            per_kind_per_minute: 1,
            wait_timeout_ms: 50,
        };
        let limiter = RateLimiter::new(config);
        assert!(limiter.acquire(RequestKind::NpcDialogue).await.is_ok());
        assert_eq!(limiter.acquire(RequestKind::NpcDialogue).await, Err(WaitTimeout));
        // a different kind still has its own token
        assert!(limiter.acquire(RequestKind::CombatNarration).await.is_ok());
    }

    #[tokio::test]
    async fn test_try_acquire_never_waits() {
        let limiter = RateLimiter::new(tight_config());
        assert!(limiter.try_acquire(RequestKind::Enrichment));
        assert!(limiter.try_acquire(RequestKind::Enrichment));
        assert!(!limiter.try_acquire(RequestKind::Enrichment));
    }
}
