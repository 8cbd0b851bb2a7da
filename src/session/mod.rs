//! Inference sessions
//!
//! One uniform generate/stream contract over whichever engine backend is
//! currently installed, with mutual exclusion over the single shared engine.
//! Generation and backend replacement acquire the same lock, so a load in
//! progress blocks new generations and vice versa; a generation can never
//! read from a transport that a concurrent load has just torn down.

pub mod prompt;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::engine::{BackendKind, EngineBackend, EngineError, GenerationParams};
use crate::types::generation::{GenerationRequest, GenerationResult};
use crate::types::model::ModelDescriptor;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum EngineState {
    #[default]
    Unloaded,
    Loading,
    Ready,
}

/// Pure in-memory snapshot of what is currently loaded.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub state: EngineState,
    pub model: Option<ModelDescriptor>,
    pub backend: Option<BackendKind>,
    pub context_size: u32,
}

/// Capacity of stream channels; small so a slow consumer applies
/// backpressure to the producer task instead of buffering a whole turn.
const STREAM_CHANNEL_CAPACITY: usize = 32;

type EngineSlot = Arc<Mutex<Option<Box<dyn EngineBackend>>>>;

/// Serialized access to the single shared engine.
///
/// Cheap to clone; clones share the same engine slot and status.
#[derive(Clone)]
pub struct InferenceSession {
    engine: EngineSlot,
    status: Arc<RwLock<SessionStatus>>,
    stream_delay: Duration,
}

impl InferenceSession {
    pub fn new(stream_delay: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(None)),
            status: Arc::new(RwLock::new(SessionStatus::default())),
            stream_delay,
        }
    }

    /// Snapshot of the current status. Never touches disk or the engine.
    pub fn status(&self) -> SessionStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    /// Acquire exclusive ownership of the engine slot. Held for the entire
    /// duration of a generation turn or a backend swap.
    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<Option<Box<dyn EngineBackend>>> {
        self.engine.clone().lock_owned().await
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        if let Ok(mut status) = self.status.write() {
            status.state = state;
        }
    }

    pub(crate) fn set_ready(
        &self,
        model: ModelDescriptor,
        backend: BackendKind,
        context_size: u32,
    ) {
        if let Ok(mut status) = self.status.write() {
            *status = SessionStatus {
                state: EngineState::Ready,
                model: Some(model),
                backend: Some(backend),
                context_size,
            };
        }
    }

    pub(crate) fn mark_unloaded(&self) {
        if let Ok(mut status) = self.status.write() {
            *status = SessionStatus::default();
        }
    }

    /// Stop and drop the current backend, if any.
    pub async fn clear(&self) {
        let mut guard = self.acquire().await;
        if let Some(mut old) = guard.take() {
            old.shutdown().await;
        }
        self.mark_unloaded();
    }

    /// Synchronous generation: build the prompt, hold the engine exclusively,
    /// aggregate the full response.
    ///
    /// Failures never propagate as errors; they come back as a
    /// [`GenerationResult`] with `error` set and the message in `text`.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let model_name = self.current_model_name();
        let prompt = prompt::build_prompt(&request.documents, &request.message);
        let params = GenerationParams::from(request);

        let mut guard = self.acquire().await;
        let Some(backend) = guard.as_mut() else {
            return GenerationResult::failure(
                "No model loaded. Load a model before generating.",
                model_name,
            );
        };

        match backend.complete(&prompt, &params).await {
            Ok(text) => GenerationResult::ok(text, model_name),
            Err(e) => {
                self.handle_turn_error(&mut guard, &e).await;
                GenerationResult::failure(format!("Error generating response: {e}"), model_name)
            }
        }
    }

    /// Streaming generation: chunks arrive on the returned channel as they
    /// are produced.
    ///
    /// The engine lock is held by the producer task for the whole turn; it is
    /// not released between chunks. Dropping the receiver does not cancel the
    /// turn, it runs to completion server-side. Backends without a native
    /// incremental mode get degraded-mode emulation: a full completion split
    /// into whitespace tokens re-emitted with a small pacing delay, so pacing
    /// in that path does not reflect true generation speed.
    pub async fn stream(&self, request: &GenerationRequest) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let prompt = prompt::build_prompt(&request.documents, &request.message);
        let params = GenerationParams::from(request);

        // Lock before returning so callers are serialized in arrival order.
        let mut guard = self.acquire().await;
        let session = self.clone();
        let delay = self.stream_delay;

        tokio::spawn(async move {
            let Some(backend) = guard.as_mut() else {
                let _ = tx
                    .send("No model loaded. Load a model before generating.".to_string())
                    .await;
                return;
            };

            let outcome = if backend.supports_streaming() {
                backend.stream(&prompt, &params, tx.clone()).await
            } else {
                match backend.complete(&prompt, &params).await {
                    Ok(text) => {
                        for token in text.split_whitespace() {
                            if tx.send(format!("{token} ")).await.is_err() {
                                break;
                            }
                            tokio::time::sleep(delay).await;
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            };

            if let Err(e) = outcome {
                tracing::warn!("streaming generation failed: {}", e);
                session.handle_turn_error(&mut guard, &e).await;
                let _ = tx.send(format!("Error generating response: {e}")).await;
            }
        });

        rx
    }

    fn current_model_name(&self) -> String {
        self.status()
            .model
            .map(|descriptor| descriptor.filename)
            .unwrap_or_default()
    }

    /// A crash invalidates the handle: the dead backend is reaped and the
    /// session returns to `Unloaded`. Other transport errors leave the
    /// backend in place.
    async fn handle_turn_error(
        &self,
        guard: &mut OwnedMutexGuard<Option<Box<dyn EngineBackend>>>,
        error: &EngineError,
    ) {
        if matches!(error, EngineError::Crashed(_)) {
            tracing::error!("engine crashed mid-turn, unloading: {}", error);
            if let Some(mut dead) = guard.take() {
                dead.shutdown().await;
            }
            self.mark_unloaded();
        }
    }
}
