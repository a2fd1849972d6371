//! LLM completion backend
//!
//! Single-prompt completions over the Ollama HTTP API, with retry and
//! exponential backoff for transient failures. The retrieval pipeline only
//! needs plain text in, plain text out; no streaming, no chat history.

pub mod backend;

pub use backend::{CompletionBackend, LlmConfig, OllamaBackend};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for docqa_core::Error {
    fn from(err: LlmError) -> Self {
        docqa_core::Error::Llm(err.to_string())
    }
}
