//! Error types for the intelligence core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("prompt template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("dispatcher is gone: {0}")]
    DispatcherGone(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
