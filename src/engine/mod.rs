//! Engine backends
//!
//! Two backend variants serve generations behind one capability set: a
//! subprocess running an external inference engine, and an in-process
//! embedded engine. The variant is selected once at load time and stored as
//! an interface value; there are no runtime capability probes beyond
//! [`EngineBackend::supports_streaming`].

pub mod embedded;
#[cfg(feature = "llama")]
pub mod llama;
pub mod process;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::generation::GenerationRequest;

/// Engine transport and lifecycle failures
#[derive(Error, Debug)]
pub enum EngineError {
    /// Executable missing, spawn failure, or the process exited immediately
    #[error("failed to launch inference engine: {0}")]
    Launch(String),
    /// The engine exited while output was still expected
    #[error("inference engine crashed: {0}")]
    Crashed(String),
    /// stdin closed or broken pipe while submitting a prompt
    #[error("failed to write to inference engine: {0}")]
    TransportWrite(String),
    /// A single transport read exceeded its upper bound
    #[error("timed out after {0:?} waiting for engine output")]
    ReadTimeout(Duration),
    /// The active backend cannot perform the requested operation
    #[error("unsupported backend operation: {0}")]
    Unsupported(String),
}

/// Which backend variant currently owns the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendKind {
    /// External engine subprocess over a line-oriented stdin/stdout transport
    Process,
    /// In-process engine library
    Embedded,
}

/// Sampling and limit parameters for one generation turn.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

impl From<&GenerationRequest> for GenerationParams {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop_sequences: request.stop_sequences.clone(),
        }
    }
}

/// One live engine instance.
///
/// Exactly one backend is live per manager; the session layer guarantees a
/// single in-flight call per backend, so implementations may assume they are
/// never re-entered.
#[async_trait]
pub trait EngineBackend: Send {
    fn kind(&self) -> BackendKind;

    /// True when the backend can emit incremental chunks natively. When
    /// false, the session layer emulates streaming from a full completion.
    fn supports_streaming(&self) -> bool;

    /// Run one full generation turn and return the aggregated text.
    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, EngineError>;

    /// Run one generation turn, sending each chunk into `tx` as it is
    /// produced. Only called when [`Self::supports_streaming`] is true.
    /// Implementations must finish the turn even if the receiver goes away,
    /// so the transport is clean for the next turn.
    async fn stream(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError>;

    /// Tear down the backend. Idempotent; always invoked before a new
    /// backend is installed so engine resources are never leaked.
    async fn shutdown(&mut self);
}
