//! Embedded engine backend
//!
//! Fallback used when the external engine executable is unavailable: an
//! in-process engine object exposing a blocking chat-completion call and an
//! optional native streaming variant, behind the same prompt contract as the
//! subprocess transport.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{BackendKind, EngineBackend, EngineError, GenerationParams};

/// An in-process chat-completion engine.
///
/// Implementations that can emit incremental deltas override
/// [`supports_streaming`](Self::supports_streaming) and
/// [`stream`](Self::stream); others get degraded-mode stream emulation one
/// layer up.
#[async_trait]
pub trait ChatEngine: Send {
    /// True when the engine emits native incremental deltas.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Run one completion to the end and return the full text.
    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, EngineError>;

    /// Send native deltas into `tx` as they are produced.
    async fn stream(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        let _ = (prompt, params, tx);
        Err(EngineError::Unsupported(
            "engine has no native streaming mode".to_string(),
        ))
    }

    /// Release engine resources. Idempotent; default is a no-op because most
    /// in-process engines free everything on drop.
    async fn shutdown(&mut self) {}
}

/// Constructs a [`ChatEngine`] for a model artifact.
///
/// Injected through the application context so the manager never hard-codes
/// a concrete engine library, and tests can substitute scripted engines.
pub trait EmbeddedEngineFactory: Send + Sync {
    fn load(
        &self,
        model_path: &Path,
        context_size: u32,
    ) -> Result<Box<dyn ChatEngine>, EngineError>;
}

/// [`EngineBackend`] over an in-process [`ChatEngine`].
pub struct EmbeddedBackend {
    engine: Box<dyn ChatEngine>,
}

impl EmbeddedBackend {
    pub fn new(engine: Box<dyn ChatEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EngineBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn supports_streaming(&self) -> bool {
        self.engine.supports_streaming()
    }

    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, EngineError> {
        self.engine.complete(prompt, params).await
    }

    async fn stream(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        self.engine.stream(prompt, params, tx).await
    }

    async fn shutdown(&mut self) {
        self.engine.shutdown().await;
    }
}
