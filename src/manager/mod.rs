//! Model manager
//!
//! Orchestrates the catalog and the inference session: discovers artifacts,
//! owns exactly one live engine backend at a time, and exposes the public
//! surface thin transport handlers call: `list_available`, `load_model`,
//! `current_model`, `unload`, `generate_sync`, `generate_stream`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::catalog::{CatalogError, ModelCatalog};
use crate::engine::embedded::{EmbeddedBackend, EmbeddedEngineFactory};
use crate::engine::process::InferenceProcess;
use crate::engine::{BackendKind, EngineBackend};
use crate::session::{EngineState, InferenceSession};
use crate::types::config::AppConfig;
use crate::types::generation::{GenerationRequest, GenerationResult};
use crate::types::model::ModelDescriptor;

/// What is currently serving generations.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModel {
    pub descriptor: ModelDescriptor,
    pub backend: BackendKind,
    pub context_size: u32,
}

pub struct ModelManager {
    catalog: ModelCatalog,
    session: InferenceSession,
    config: AppConfig,
    embedded_factory: Option<Arc<dyn EmbeddedEngineFactory>>,
}

impl ModelManager {
    pub fn new(config: AppConfig) -> Self {
        Self {
            catalog: ModelCatalog::new(config.models_dir.clone()),
            session: InferenceSession::new(Duration::from_millis(config.stream_delay_ms)),
            config,
            embedded_factory: None,
        }
    }

    /// Register the embedded engine used when the external executable is
    /// unavailable. Without a factory, failed process launches fail the load.
    pub fn with_embedded_factory(mut self, factory: Arc<dyn EmbeddedEngineFactory>) -> Self {
        self.embedded_factory = Some(factory);
        self
    }

    /// Startup pass: ensure the models directory exists, scan it, and
    /// auto-load the first discovered model if any.
    pub async fn initialize(&self) -> Result<(), CatalogError> {
        std::fs::create_dir_all(&self.config.models_dir)?;
        let models = self.list_available()?;
        tracing::info!("found {} local models", models.len());
        if let Some(first) = models.first() {
            if !self.load_model(&first.filename).await {
                tracing::warn!("failed to auto-load default model {}", first.filename);
            }
        }
        Ok(())
    }

    /// Fresh catalog scan on every call; the filesystem is the source of
    /// truth, so listings are never stale.
    pub fn list_available(&self) -> Result<Vec<ModelDescriptor>, CatalogError> {
        self.catalog.scan()
    }

    /// Load a model by artifact filename.
    ///
    /// Stops the current backend, then tries the external engine process and
    /// falls back to the embedded engine, in that priority order. Returns
    /// `false` on any failure; no error type crosses this boundary. Loads are
    /// serialized against each other and against generations by the session
    /// lock, so two rapid loads can never leave two engines alive.
    pub async fn load_model(&self, name: &str) -> bool {
        // Artifact names are bare filenames, never paths.
        if name.contains('/') || name.contains('\\') {
            tracing::warn!("rejecting model name with path separators: {}", name);
            return false;
        }

        let model_path = self.config.models_dir.join(name);
        if !model_path.is_file() {
            tracing::warn!("model not found: {}", model_path.display());
            return false;
        }
        let descriptor = match ModelDescriptor::from_path(&model_path) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!("cannot stat model {}: {}", model_path.display(), e);
                return false;
            }
        };

        tracing::info!("loading model: {}", name);
        let mut guard = self.session.acquire().await;
        self.session.set_state(EngineState::Loading);

        // Hard invariant: the previous engine is torn down before a new one
        // starts, or we leak a process still holding the model's memory.
        if let Some(mut old) = guard.take() {
            old.shutdown().await;
        }

        let spawned = InferenceProcess::spawn(
            &self.config.engine_path,
            &descriptor.path,
            self.config.context_size,
            self.config.sentinel.clone(),
            Duration::from_secs(self.config.read_timeout_secs),
        )
        .await;

        let backend: Box<dyn EngineBackend> = match spawned {
            Ok(process) => Box::new(process),
            Err(e) => {
                tracing::warn!("engine process unavailable ({}), trying embedded backend", e);
                let Some(factory) = self.embedded_factory.as_ref() else {
                    tracing::error!("no embedded backend configured; load failed");
                    self.session.mark_unloaded();
                    return false;
                };
                match factory.load(&descriptor.path, self.config.context_size) {
                    Ok(engine) => Box::new(EmbeddedBackend::new(engine)),
                    Err(e) => {
                        tracing::error!("embedded backend failed to load {}: {}", name, e);
                        self.session.mark_unloaded();
                        return false;
                    }
                }
            }
        };

        let kind = backend.kind();
        *guard = Some(backend);
        self.session
            .set_ready(descriptor, kind, self.config.context_size);
        tracing::info!("model loaded: {} ({:?} backend)", name, kind);
        true
    }

    /// Currently loaded model, if any. Pure in-memory read.
    pub fn current_model(&self) -> Option<LoadedModel> {
        let status = self.session.status();
        let descriptor = status.model?;
        Some(LoadedModel {
            descriptor,
            backend: status.backend?,
            context_size: status.context_size,
        })
    }

    /// Engine lifecycle state.
    pub fn state(&self) -> EngineState {
        self.session.status().state
    }

    /// Stop the current backend. Subsequent generations report "no model
    /// loaded" through the errorFlag shape until a load succeeds.
    pub async fn unload(&self) {
        self.session.clear().await;
        tracing::info!("model unloaded");
    }

    /// Synchronous generation. See [`InferenceSession::generate`].
    pub async fn generate_sync(&self, request: &GenerationRequest) -> GenerationResult {
        self.session.generate(request).await
    }

    /// Streaming generation. See [`InferenceSession::stream`].
    pub async fn generate_stream(&self, request: &GenerationRequest) -> mpsc::Receiver<String> {
        self.session.stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{log_entries, new_log, CallLog, ScriptedFactory};
    use crate::types::model::ModelFamily;
    use std::fs;
    use std::path::Path;

    /// Manager over a temp models dir, a nonexistent engine executable and a
    /// scripted embedded factory, so every load exercises the fallback path.
    fn test_manager(models_dir: &Path, response: &str, log: &CallLog) -> ModelManager {
        let mut config = AppConfig::default();
        config.models_dir = models_dir.to_path_buf();
        config.engine_path = models_dir.join("no-such-engine");
        config.stream_delay_ms = 1;
        ModelManager::new(config)
            .with_embedded_factory(Arc::new(ScriptedFactory::new(response, log.clone())))
    }

    fn put_model(dir: &Path, name: &str, size: usize) {
        fs::write(dir.join(name), vec![0u8; size]).unwrap();
    }

    #[tokio::test]
    async fn test_list_available_counts_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        put_model(dir.path(), "phi-3-mini.gguf", 200);
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);

        let models = manager.list_available().unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.size_bytes > 0));
        assert_eq!(models[0].family, ModelFamily::Phi);
        assert_eq!(models[1].family, ModelFamily::Generic);
    }

    #[tokio::test]
    async fn test_load_nonexistent_model_returns_false_without_teardown() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);

        assert!(manager.load_model("tiny.gguf").await);
        let before = log_entries(&log);

        assert!(!manager.load_model("missing.gguf").await);
        // Prior handle untouched: no stop was recorded and the model is
        // still current.
        assert_eq!(log_entries(&log), before);
        assert_eq!(
            manager.current_model().unwrap().descriptor.filename,
            "tiny.gguf"
        );
        assert_eq!(manager.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_load_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);
        assert!(!manager.load_model("../etc/passwd").await);
    }

    #[tokio::test]
    async fn test_every_start_is_preceded_by_a_stop() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "a.gguf", 100);
        put_model(dir.path(), "b.gguf", 100);
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);

        assert!(manager.load_model("a.gguf").await);
        assert!(manager.load_model("b.gguf").await);
        assert!(manager.load_model("a.gguf").await);

        assert_eq!(
            log_entries(&log),
            vec![
                "start:a.gguf",
                "stop:a.gguf",
                "start:b.gguf",
                "stop:b.gguf",
                "start:a.gguf",
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_loads_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "a.gguf", 100);
        put_model(dir.path(), "b.gguf", 100);
        let log = new_log();
        let manager = Arc::new(test_manager(dir.path(), "ok", &log));

        let m1 = manager.clone();
        let m2 = manager.clone();
        let t1 = tokio::spawn(async move { m1.load_model("a.gguf").await });
        let t2 = tokio::spawn(async move { m2.load_model("b.gguf").await });
        assert!(t1.await.unwrap());
        assert!(t2.await.unwrap());

        // Whatever the arrival order, every start except the first must be
        // directly preceded by the stop of the prior handle.
        let entries = log_entries(&log);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].starts_with("start:"));
        assert!(entries[1].starts_with("stop:"));
        assert!(entries[2].starts_with("start:"));
    }

    #[tokio::test]
    async fn test_unload_then_generate_reports_no_model() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);

        assert!(manager.load_model("tiny.gguf").await);
        manager.unload().await;
        assert_eq!(manager.state(), EngineState::Unloaded);
        assert!(manager.current_model().is_none());

        let result = manager.generate_sync(&GenerationRequest::new("hi")).await;
        assert!(result.error);
        assert!(result.text.contains("No model loaded"));
    }

    #[tokio::test]
    async fn test_end_to_end_embedded_fallback() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 800 * 1024); // stand-in artifact
        let log = new_log();
        let manager = test_manager(dir.path(), "hello from the model", &log);

        let models = manager.list_available().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].filename, "tiny.gguf");
        assert_eq!(models[0].family, ModelFamily::Generic);

        // No engine executable present: falls back to embedded mode.
        assert!(manager.load_model("tiny.gguf").await);
        let loaded = manager.current_model().unwrap();
        assert_eq!(loaded.backend, BackendKind::Embedded);

        let mut request = GenerationRequest::new("hi");
        request.max_tokens = 16;
        let result = manager.generate_sync(&request).await;
        assert!(!result.error);
        assert!(!result.text.is_empty());
        assert_eq!(result.model, "tiny.gguf");
        assert!(result.tokens_used > 0);
    }

    #[tokio::test]
    async fn test_stream_matches_sync_text() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let log = new_log();
        let manager = test_manager(dir.path(), "hello world foo", &log);
        assert!(manager.load_model("tiny.gguf").await);

        let request = GenerationRequest::new("hi");
        let mut rx = manager.generate_stream(&request).await;
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["hello ", "world ", "foo "]);

        let sync = manager.generate_sync(&request).await;
        assert_eq!(chunks.concat().trim_end(), sync.text);
    }

    #[tokio::test]
    async fn test_embedded_factory_failure_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let log = new_log();
        let mut factory = ScriptedFactory::new("ok", log.clone());
        factory.fail = true;

        let mut config = AppConfig::default();
        config.models_dir = dir.path().to_path_buf();
        config.engine_path = dir.path().join("no-such-engine");
        let manager = ModelManager::new(config).with_embedded_factory(Arc::new(factory));

        assert!(!manager.load_model("tiny.gguf").await);
        assert_eq!(manager.state(), EngineState::Unloaded);
    }

    #[tokio::test]
    async fn test_no_factory_and_no_engine_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let mut config = AppConfig::default();
        config.models_dir = dir.path().to_path_buf();
        config.engine_path = dir.path().join("no-such-engine");
        let manager = ModelManager::new(config);

        assert!(!manager.load_model("tiny.gguf").await);
        assert!(manager.current_model().is_none());
    }

    #[tokio::test]
    async fn test_initialize_auto_loads_first_model() {
        let dir = tempfile::tempdir().unwrap();
        put_model(dir.path(), "tiny.gguf", 100);
        let log = new_log();
        let manager = test_manager(dir.path(), "ok", &log);

        manager.initialize().await.unwrap();
        assert_eq!(manager.state(), EngineState::Ready);
        assert_eq!(
            manager.current_model().unwrap().descriptor.filename,
            "tiny.gguf"
        );
    }
}
