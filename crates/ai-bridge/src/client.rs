//! LLM backend contract and its implementations
//!
//! The core is model-agnostic: one async operation, typed errors. The
//! OpenAI implementation rides openai_dive; the scripted client drives
//! every test that needs a backend with a personality disorder.

use async_trait::async_trait;
use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::{
    ChatCompletionParameters, ChatMessage, ChatMessageContent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// One completion request, fully resolved by the router before dispatch.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model_id: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("rate limited by backend")]
    RateLimited,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl LlmError {
    /// Transient and backend-throttle errors earn a retry; auth and
    /// malformed requests go straight to fallback.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient(_) | LlmError::RateLimited)
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Chat-completions client over openai_dive.
pub struct OpenAiChatClient {
    client: Client,
}

impl OpenAiChatClient {
    pub fn new() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Auth("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self { client: Client::new(api_key) })
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::System {
                content: ChatMessageContent::Text(request.system_prompt.clone()),
                name: None,
            },
            ChatMessage::User {
                content: ChatMessageContent::Text(request.user_prompt.clone()),
                name: None,
            },
        ];

        let parameters = ChatCompletionParameters {
            model: request.model_id.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(parameters)
            .await
            .map_err(|e| {
                let text = e.to_string();
                if text.contains("401") || text.contains("invalid_api_key") {
                    LlmError::Auth(text)
                } else if text.contains("429") {
                    LlmError::RateLimited
                } else {
                    LlmError::Transient(text)
                }
            })?;

        if let Some(choice) = response.choices.first() {
            if let ChatMessage::Assistant { content: Some(ChatMessageContent::Text(text)), .. } =
                &choice.message
            {
                return Ok(text.clone());
            }
        }
        Err(LlmError::Invalid("no text content in completion".to_string()))
    }
}

/// A reply the scripted client will serve.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(LlmError),
    /// Sleep, then reply. For exercising deadlines.
    Delayed(u64, String),
}

/// Deterministic test backend: serves a queue of scripted replies, then a
/// default, and counts every call it sees.
pub struct ScriptedClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    default: ScriptedReply,
    calls: AtomicU32,
}

impl ScriptedClient {
    pub fn always_text(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: ScriptedReply::Text(text.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_error(error: LlmError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: ScriptedReply::Error(error),
            calls: AtomicU32::new(0),
        }
    }

    /// Serve `script` in order, then fall through to `default`.
    pub fn with_script(script: Vec<ScriptedReply>, default: ScriptedReply) -> Self {
        Self { script: Mutex::new(script.into()), default, calls: AtomicU32::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut script = self.script.lock().expect("script lock");
            script.pop_front().unwrap_or_else(|| self.default.clone())
        };
        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Error(error) => Err(error),
            ScriptedReply::Delayed(ms, text) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(text)
            }
        }
    }
}
