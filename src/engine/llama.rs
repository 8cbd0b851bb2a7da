//! In-process llama.cpp engine
//!
//! [`ChatEngine`] implementation backed by llama-cpp-2, used as the fallback
//! backend when no external engine executable is installed. Compiled only
//! with the `llama` cargo feature.

use std::num::NonZeroU32;
use std::path::Path;

use async_trait::async_trait;
use llama_cpp_2::{
    context::params::LlamaContextParams,
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaModel},
    token::LlamaToken,
};
use tokio::sync::mpsc;

use crate::engine::embedded::{ChatEngine, EmbeddedEngineFactory};
use crate::engine::{EngineError, GenerationParams};

/// llama.cpp model loaded in-process.
pub struct LlamaEngine {
    backend: LlamaBackend,
    model: LlamaModel,
    context_params: LlamaContextParams,
}

impl LlamaEngine {
    /// Load a GGUF model from disk. Heavy: reads the whole artifact.
    pub fn load(model_path: &Path, context_size: u32) -> Result<Self, EngineError> {
        let backend = LlamaBackend::init()
            .map_err(|e| EngineError::Launch(format!("llama backend init failed: {e:?}")))?;

        let model_params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(&backend, model_path, &model_params)
            .map_err(|e| {
                EngineError::Launch(format!(
                    "failed to load model {}: {e:?}",
                    model_path.display()
                ))
            })?;

        let context_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(context_size))
            .with_n_batch(512);

        tracing::info!(
            "embedded llama engine loaded {} ({} params)",
            model_path.display(),
            model.n_params()
        );

        Ok(Self {
            backend,
            model,
            context_params,
        })
    }

    /// Greedy token-by-token generation, invoking `emit` per token piece.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        mut emit: impl FnMut(&str),
    ) -> Result<String, EngineError> {
        // A fresh context per turn sidesteps context/model lifetime coupling
        // and leaves no KV-cache state between turns.
        let mut context = self
            .model
            .new_context(&self.backend, self.context_params.clone())
            .map_err(|e| EngineError::Crashed(format!("failed to create context: {e:?}")))?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| EngineError::Crashed(format!("failed to tokenize prompt: {e:?}")))?;

        let mut batch = LlamaBatch::new(512, 1);
        for (i, token) in tokens.iter().enumerate() {
            let is_last = i == tokens.len() - 1;
            batch
                .add(*token, i as i32, &[0], is_last)
                .map_err(|e| EngineError::Crashed(format!("batch add failed: {e:?}")))?;
        }
        context
            .decode(&mut batch)
            .map_err(|e| EngineError::Crashed(format!("prompt decode failed: {e:?}")))?;

        let eos = self.model.token_eos();
        let n_vocab = self.model.n_vocab() as usize;
        let mut text = String::new();
        let mut position = tokens.len() as i32;

        for _ in 0..params.max_tokens {
            // Greedy sampling over the last logits row.
            let logits = context.get_logits_ith(batch.n_tokens() - 1);
            let mut best = 0usize;
            let mut best_logit = f32::NEG_INFINITY;
            for (i, &logit) in logits.iter().enumerate().take(n_vocab) {
                if logit > best_logit {
                    best_logit = logit;
                    best = i;
                }
            }
            let token = LlamaToken(best as i32);
            if token.0 == eos.0 {
                break;
            }

            if let Ok(bytes) = self
                .model
                .token_to_bytes(token, llama_cpp_2::model::Special::Tokenize)
            {
                if let Ok(piece) = String::from_utf8(bytes) {
                    text.push_str(&piece);
                    emit(&piece);
                }
            }

            if params
                .stop_sequences
                .iter()
                .any(|stop| !stop.is_empty() && text.ends_with(stop))
            {
                break;
            }

            batch.clear();
            batch
                .add(token, position, &[0], true)
                .map_err(|e| EngineError::Crashed(format!("batch add failed: {e:?}")))?;
            position += 1;
            context
                .decode(&mut batch)
                .map_err(|e| EngineError::Crashed(format!("token decode failed: {e:?}")))?;
        }

        Ok(text)
    }
}

#[async_trait]
impl ChatEngine for LlamaEngine {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, EngineError> {
        self.generate(prompt, params, |_| {}).await
    }

    async fn stream(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        let mut pieces: Vec<String> = Vec::new();
        self.generate(prompt, params, |piece| pieces.push(piece.to_string()))
            .await?;
        for piece in pieces {
            if tx.send(piece).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Factory wiring [`LlamaEngine`] into the embedded fallback path.
pub struct LlamaEngineFactory;

impl EmbeddedEngineFactory for LlamaEngineFactory {
    fn load(
        &self,
        model_path: &Path,
        context_size: u32,
    ) -> Result<Box<dyn ChatEngine>, EngineError> {
        Ok(Box::new(LlamaEngine::load(model_path, context_size)?))
    }
}
