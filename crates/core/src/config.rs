//! Runtime configuration for a session
//!
//! Every knob has a compiled-in default; a TOML file can override any
//! subset. The intelligence core, world store, and session loop all read
//! from one `CoreConfig` owned by the session.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Model identifier handed to the LLM client.
    pub model_id: String,
    pub memory: MemoryConfig,
    pub context: ContextConfig,
    pub limits: RateLimitConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term window size before condensation triggers.
    pub short_term_window: usize,
    /// How many oldest events one condensation collapses.
    pub condense_chunk: usize,
    /// Token cap on the condensed replacement string.
    pub summary_token_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Hard token budget for an assembled prompt context.
    pub token_budget: usize,
    /// How many recent player actions the context carries.
    pub recent_actions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub per_kind_per_minute: u32,
    /// How long a request may wait on the bucket before falling back.
    pub wait_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Most prefetches scheduled per player move.
    pub per_move_budget: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            model_id: "gpt-4o".to_string(),
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { short_term_window: 16, condense_chunk: 6, summary_token_budget: 256 }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { token_budget: 2048, recent_actions: 3 }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_minute: 60, per_kind_per_minute: 30, wait_timeout_ms: 2_000 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff_ms: 250 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { per_move_budget: 4 }
    }
}

impl CoreConfig {
    /// Load overrides from a TOML file on top of the defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: CoreConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = CoreConfig::default();
        assert!(config.memory.condense_chunk < config.memory.short_term_window);
        assert!(config.retry.max_attempts >= 1);
        assert!(config.prefetch.per_move_budget > 0);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: CoreConfig = toml::from_str(
            r#"
            model_id = "local-test"

            [memory]
            short_term_window = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.model_id, "local-test");
        assert_eq!(config.memory.short_term_window, 8);
        // untouched sections keep their defaults
        assert_eq!(config.cache.capacity, 256);
    }
}
