//! Intelligence core for Tile-Crawler
//!
//! Turns player actions into coherent world content against a remote,
//! rate-limited, fallible LLM backend. The pipeline: a context assembler
//! builds a token-budgeted prompt payload, the router fingerprints it,
//! consults the cache and the in-flight table, and otherwise enqueues the
//! request on a priority queue; the dispatcher rate-limits, retries, and
//! validates untrusted model output into closed typed responses, falling
//! back to deterministic procedural content whenever the model cannot
//! deliver. The game never stalls on the LLM.

pub mod bridge;
pub mod cache;
pub mod client;
pub mod context;
pub mod error;
pub mod fallback;
pub mod fingerprint;
pub mod kind;
pub mod limiter;
pub mod memory;
pub mod metrics;
pub mod prompts;
pub mod response;
pub mod validate;

pub use bridge::{Delivery, Intelligence, RequestResult, ResponseSource};
pub use client::{LlmClient, LlmError, LlmRequest, OpenAiChatClient, ScriptedClient};
pub use context::{RequestContext, RequestPayload};
pub use error::{BridgeError, Result};
pub use fingerprint::Fingerprint;
pub use kind::RequestKind;
pub use memory::{MemoryRecord, NarrativeMemory};
pub use metrics::{MetricsSink, MetricsSnapshot};
pub use response::{
    Atmosphere, CombatNarrationOut, Emotion, NpcDialogueOut, QuestOut, RoomDescriptionOut,
    SummaryOut, TradeOffer, ValidatedResponse,
};
