//! Generation types
//!
//! Request and result shapes for one generation turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default stop sequences sent to the engine.
pub fn default_stop_sequences() -> Vec<String> {
    vec!["</s>".to_string(), "###".to_string()]
}

/// One generation request. Transient, one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user message to answer
    pub message: String,
    /// Already-extracted document texts to use as context
    #[serde(default)]
    pub documents: Vec<String>,
    /// Upper bound on generated tokens (also caps transport lines read)
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Ordered stop sequences
    pub stop_sequences: Vec<String>,
}

impl GenerationRequest {
    /// Request with default sampling parameters.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach document context to the request.
    pub fn with_documents(mut self, documents: Vec<String>) -> Self {
        self.documents = documents;
        self
    }
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            message: String::new(),
            documents: Vec::new(),
            max_tokens: 2048,
            temperature: 0.7,
            stop_sequences: default_stop_sequences(),
        }
    }
}

/// Outcome of one generation turn. Never mutated after return.
///
/// Failures are reported through `error`, not through a Rust error type:
/// synchronous and streaming paths share this one failure-reporting shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated text, or a human-readable failure message when `error` is set
    pub text: String,
    /// Whitespace-token estimate of tokens used
    pub tokens_used: u32,
    /// Name of the model that served the turn
    pub model: String,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
    /// Sole signal of failure; callers must check this, not HTTP status
    pub error: bool,
}

impl GenerationResult {
    /// Successful result; the token estimate is derived from the text.
    pub fn ok(text: impl Into<String>, model: impl Into<String>) -> Self {
        let text = text.into();
        let tokens_used = text.split_whitespace().count() as u32;
        Self {
            text,
            tokens_used,
            model: model.into(),
            timestamp: Utc::now(),
            error: false,
        }
    }

    /// Failed result carrying a human-readable message in `text`.
    pub fn failure(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            tokens_used: 0,
            model: model.into(),
            timestamp: Utc::now(),
            error: true,
        }
    }
}
