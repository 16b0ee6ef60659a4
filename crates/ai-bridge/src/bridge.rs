//! The request router and dispatcher
//!
//! One `Intelligence` per session. Requests are fingerprinted, checked
//! against the cache and the in-flight table, then queued by priority for
//! the dispatcher task, which rate-limits, calls the backend with retries
//! and a deadline, validates, and falls back procedurally when the model
//! fails. At most one generation per fingerprint is ever in flight; every
//! waiter on that fingerprint sees the same validated result.

use crate::cache::ResponseCache;
use crate::client::{LlmClient, LlmRequest};
use crate::context::{ContextAssembler, RequestContext, RequestPayload};
use crate::error::Result;
use crate::fallback;
use crate::fingerprint::Fingerprint;
use crate::kind::RequestKind;
use crate::limiter::RateLimiter;
use crate::metrics::{MetricsSink, MetricsSnapshot, RequestOutcome};
use crate::prompts::{PromptKernel, RenderedPrompt};
use crate::response::{RoomDescriptionOut, ValidatedResponse};
use crate::validate;
use crawler_core::{Coord, CoreConfig, Legend};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Where a result came from, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Generated,
    Fallback,
    Deduplicated,
}

#[derive(Debug, Clone)]
pub struct RequestResult {
    pub response: ValidatedResponse,
    pub source: ResponseSource,
}

/// Completed background work, delivered to the session loop for
/// application to world state.
#[derive(Debug, Clone)]
pub enum Delivery {
    Enrichment { coord: Coord, room: RoomDescriptionOut },
    Summary { upto_event_id: u64, text: String },
}

struct Job {
    kind: RequestKind,
    context: RequestContext,
    fingerprint: Fingerprint,
    prompt: RenderedPrompt,
    prompt_tokens: usize,
    background: bool,
    seq: u64,
}

/// Heap wrapper: lowest (priority, seq) pops first.
struct QueuedJob(Job);

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.0.seq == other.0.seq
    }
}
impl Eq for QueuedJob {}
impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.0.kind.priority(), other.0.seq).cmp(&(self.0.kind.priority(), self.0.seq))
    }
}

struct Shared {
    config: CoreConfig,
    client: Arc<dyn LlmClient>,
    legend: Legend,
    cache: Mutex<ResponseCache>,
    inflight: Mutex<HashMap<Fingerprint, Vec<oneshot::Sender<RequestResult>>>>,
    limiter: RateLimiter,
    metrics: MetricsSink,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

pub struct Intelligence {
    shared: Arc<Shared>,
    assembler: ContextAssembler,
    kernel: PromptKernel,
    queue_tx: mpsc::UnboundedSender<Job>,
    seq: AtomicU64,
}

impl Intelligence {
    /// Build the core and spawn its dispatcher task. The returned receiver
    /// carries completed background work (enrichments, summaries).
    pub fn new(
        config: CoreConfig,
        client: Arc<dyn LlmClient>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Delivery>)> {
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            limiter: RateLimiter::new(config.limits.clone()),
            legend: Legend::standard(),
            cache: Mutex::new(ResponseCache::new(config.cache.capacity)),
            inflight: Mutex::new(HashMap::new()),
            metrics: MetricsSink::new(),
            deliveries: deliveries_tx,
            client,
            config,
        });
        let assembler = ContextAssembler::new(shared.config.context.token_budget)?;
        let kernel = PromptKernel::new()?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(shared.clone(), queue_rx));

        Ok((
            Self { shared, assembler, kernel, queue_tx, seq: AtomicU64::new(0) },
            deliveries_rx,
        ))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Shared handle to the metrics sink; stays live after the core moves
    /// into its owning task.
    pub fn metrics_sink(&self) -> MetricsSink {
        self.shared.metrics.clone()
    }

    pub fn fingerprint_for(&self, ctx: &RequestContext) -> Fingerprint {
        self.assembler.fingerprint(ctx, &self.shared.config.model_id)
    }

    /// Pin a context's cache entry while its world state is live.
    pub fn pin(&self, ctx: &RequestContext) -> Fingerprint {
        let fingerprint = self.fingerprint_for(ctx);
        self.shared.cache.lock().expect("cache lock").pin(fingerprint);
        fingerprint
    }

    pub fn unpin(&self, fingerprint: &Fingerprint) {
        self.shared.cache.lock().expect("cache lock").unpin(fingerprint);
    }

    /// Foreground request: resolves from cache, a shared in-flight call, a
    /// fresh generation, or fallback. Never errors; the game never stalls.
    pub async fn request(&self, ctx: RequestContext) -> RequestResult {
        let kind = ctx.kind;
        let fingerprint = self.fingerprint_for(&ctx);

        if let Some(hit) = self.shared.cache.lock().expect("cache lock").get(&fingerprint) {
            self.shared.metrics.record_cache_hit(kind);
            return RequestResult { response: hit, source: ResponseSource::Cache };
        }

        let (tx, rx) = oneshot::channel();
        let is_new = {
            let mut inflight = self.shared.inflight.lock().expect("inflight lock");
            match inflight.get_mut(&fingerprint) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    inflight.insert(fingerprint, vec![tx]);
                    true
                }
            }
        };

        if is_new {
            self.enqueue(ctx.clone(), fingerprint, false);
        } else {
            self.shared.metrics.record_dedup_hit(kind);
        }

        match rx.await {
            Ok(mut result) => {
                if !is_new && result.source != ResponseSource::Cache {
                    result.source = ResponseSource::Deduplicated;
                }
                result
            }
            // dispatcher gone; procedural content keeps the game moving
            Err(_) => RequestResult {
                response: fallback::generate(fingerprint, &ctx),
                source: ResponseSource::Fallback,
            },
        }
    }

    /// Background request: fire and forget, result lands on the delivery
    /// channel and in the cache. Deduplicates against in-flight work.
    pub fn spawn_background(&self, ctx: RequestContext) {
        let fingerprint = self.fingerprint_for(&ctx);
        {
            let cache = &mut *self.shared.cache.lock().expect("cache lock");
            if let Some(hit) = cache.get(&fingerprint) {
                deliver_background(&self.shared, &ctx.payload, &hit);
                return;
            }
        }
        {
            let mut inflight = self.shared.inflight.lock().expect("inflight lock");
            if inflight.contains_key(&fingerprint) {
                self.shared.metrics.record_dedup_hit(ctx.kind);
                return;
            }
            inflight.insert(fingerprint, Vec::new());
        }
        self.enqueue(ctx, fingerprint, true);
    }

    /// Schedule up to the configured per-move budget of prefetch contexts.
    pub fn schedule_prefetch(&self, contexts: Vec<RequestContext>) {
        let budget = self.shared.config.prefetch.per_move_budget;
        for ctx in contexts.into_iter().take(budget) {
            self.spawn_background(ctx);
        }
    }

    fn enqueue(&self, ctx: RequestContext, fingerprint: Fingerprint, background: bool) {
        let assembled = self.assembler.assemble(&ctx);
        let prompt_tokens = self.assembler.count_tokens(&assembled.text);
        let prompt = match self.kernel.render(
            ctx.kind,
            &assembled.text,
            self.shared.config.memory.summary_token_budget,
        ) {
            Ok(prompt) => prompt,
            Err(e) => {
                // template failure is unrecoverable for this request;
                // settle everyone with fallback content
                warn!(kind = ctx.kind.label(), error = %e, "prompt render failed");
                let response = fallback::generate(fingerprint, &ctx);
                settle(&self.shared, fingerprint, &ctx, response, ResponseSource::Fallback, background);
                return;
            }
        };
        let job = Job {
            kind: ctx.kind,
            context: ctx,
            fingerprint,
            prompt,
            prompt_tokens,
            background,
            seq: self.seq.fetch_add(1, AtomicOrdering::SeqCst),
        };
        if self.queue_tx.send(job).is_err() {
            warn!("dispatcher queue closed");
        }
    }
}

async fn run_dispatcher(shared: Arc<Shared>, mut queue_rx: mpsc::UnboundedReceiver<Job>) {
    let mut heap: BinaryHeap<QueuedJob> = BinaryHeap::new();
    loop {
        // drain arrivals so fresh foreground work outranks queued prefetch
        while let Ok(job) = queue_rx.try_recv() {
            heap.push(QueuedJob(job));
        }
        match heap.pop() {
            Some(QueuedJob(job)) => process_job(&shared, job).await,
            None => match queue_rx.recv().await {
                Some(job) => {
                    heap.push(QueuedJob(job));
                }
                None => break,
            },
        }
    }
}

async fn process_job(shared: &Arc<Shared>, job: Job) {
    let started = Instant::now();

    // the cache may have filled while this job sat in the queue
    let cached = shared.cache.lock().expect("cache lock").get(&job.fingerprint);
    if let Some(hit) = cached {
        shared.metrics.record_cache_hit(job.kind);
        settle(shared, job.fingerprint, &job.context, hit, ResponseSource::Cache, job.background);
        return;
    }

    let generated = match shared.limiter.acquire(job.kind).await {
        Err(_) => {
            shared.metrics.record_rate_limit_timeout(job.kind);
            debug!(kind = job.kind.label(), "rate limit wait timed out");
            None
        }
        Ok(()) => attempt_generation(shared, &job).await,
    };

    let (response, source, outcome) = match generated {
        Some(validated) => (validated, ResponseSource::Generated, RequestOutcome::Success),
        None => (
            fallback::generate(job.fingerprint, &job.context),
            ResponseSource::Fallback,
            RequestOutcome::Fallback,
        ),
    };

    shared.metrics.record_outcome(job.kind, outcome, started.elapsed(), job.prompt_tokens);
    shared
        .cache
        .lock()
        .expect("cache lock")
        .insert(job.fingerprint, job.kind, response.clone());
    settle(shared, job.fingerprint, &job.context, response, source, job.background);
}

/// Call the backend with retries, a deadline, and validation. `None` means
/// the fallback engine takes over.
async fn attempt_generation(shared: &Arc<Shared>, job: &Job) -> Option<ValidatedResponse> {
    let overall_deadline = Instant::now() + Duration::from_millis(job.kind.deadline_ms());
    let request = LlmRequest {
        model_id: shared.config.model_id.clone(),
        system_prompt: job.prompt.system.clone(),
        user_prompt: job.prompt.user.clone(),
        temperature: job.kind.temperature(),
        max_tokens: job.kind.max_tokens(),
        deadline_ms: job.kind.deadline_ms(),
    };
    let max_attempts = shared.config.retry.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let remaining = overall_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(kind = job.kind.label(), "deadline exhausted");
            return None;
        }

        match tokio::time::timeout(remaining, shared.client.complete(&request)).await {
            Ok(Ok(text)) => {
                match validate::validate(job.kind.schema_kind(), &text, &shared.legend) {
                    Ok(validated) => return Some(validated),
                    Err(error) => {
                        // post-repair validation failure is not retryable
                        shared.metrics.record_validation_failure(job.kind);
                        warn!(kind = job.kind.label(), %error, "response failed validation");
                        return None;
                    }
                }
            }
            Ok(Err(error)) if error.is_retryable() => {
                shared.metrics.record_retry(job.kind);
                debug!(kind = job.kind.label(), %error, attempt, "transient backend failure");
                if attempt == max_attempts {
                    return None;
                }
                backoff(shared, attempt, overall_deadline).await;
            }
            Ok(Err(error)) => {
                warn!(kind = job.kind.label(), %error, "non-retryable backend failure");
                return None;
            }
            Err(_elapsed) => {
                shared.metrics.record_retry(job.kind);
                debug!(kind = job.kind.label(), attempt, "backend call timed out");
                if attempt == max_attempts {
                    return None;
                }
            }
        }
    }
    None
}

async fn backoff(shared: &Arc<Shared>, attempt: u32, overall_deadline: Instant) {
    let base = shared.config.retry.base_backoff_ms.max(1);
    let exp = base.saturating_mul(1 << (attempt - 1).min(8));
    let jitter = rand::rng().random_range(0..base.max(2) / 2 + 1);
    let wait = Duration::from_millis(exp + jitter)
        .min(overall_deadline.saturating_duration_since(Instant::now()));
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

/// Hand a finished result to every waiter and, for background work, to the
/// delivery channel.
fn settle(
    shared: &Arc<Shared>,
    fingerprint: Fingerprint,
    ctx: &RequestContext,
    response: ValidatedResponse,
    source: ResponseSource,
    background: bool,
) {
    let waiters = shared
        .inflight
        .lock()
        .expect("inflight lock")
        .remove(&fingerprint)
        .unwrap_or_default();
    for tx in waiters {
        let _ = tx.send(RequestResult { response: response.clone(), source });
    }
    if background {
        deliver_background(shared, &ctx.payload, &response);
    }
}

fn deliver_background(shared: &Arc<Shared>, payload: &RequestPayload, response: &ValidatedResponse) {
    let delivery = match (payload, response) {
        (RequestPayload::RoomDescription { coord, .. }, ValidatedResponse::Room(room)) => {
            Some(Delivery::Enrichment { coord: *coord, room: room.clone() })
        }
        (
            RequestPayload::Summarization { upto_event_id, .. },
            ValidatedResponse::Summary(summary),
        ) => Some(Delivery::Summary {
            upto_event_id: *upto_event_id,
            text: summary.summary.clone(),
        }),
        _ => None,
    };
    if let Some(delivery) = delivery {
        let _ = shared.deliveries.send(delivery);
    }
}
