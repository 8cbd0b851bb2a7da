//! Application context
//!
//! Explicit wiring of configuration and services, constructed once at
//! startup and handed to whatever surface drives the core (the bundled CLI,
//! or HTTP/WS handlers layered on top). Keeping this an ordinary value
//! instead of a module-level singleton lets tests build isolated instances.

use std::sync::Arc;

use crate::engine::embedded::EmbeddedEngineFactory;
use crate::manager::ModelManager;
use crate::types::config::AppConfig;

pub struct AppContext {
    pub config: AppConfig,
    pub manager: ModelManager,
}

impl AppContext {
    pub fn new(mut config: AppConfig) -> Self {
        config.validate();
        let manager = ModelManager::new(config.clone());
        Self { config, manager }
    }

    /// Context with an embedded engine fallback registered.
    pub fn with_embedded_factory(
        mut config: AppConfig,
        factory: Arc<dyn EmbeddedEngineFactory>,
    ) -> Self {
        config.validate();
        let manager = ModelManager::new(config.clone()).with_embedded_factory(factory);
        Self { config, manager }
    }

    /// Context with the in-process llama.cpp fallback.
    #[cfg(feature = "llama")]
    pub fn with_llama(config: AppConfig) -> Self {
        Self::with_embedded_factory(config, Arc::new(crate::engine::llama::LlamaEngineFactory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_validates_config() {
        let mut config = AppConfig::default();
        config.temperature = 9.0;
        let context = AppContext::new(config);
        assert_eq!(context.config.temperature, 2.0);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let a = AppContext::new(AppConfig::default());
        let b = AppContext::new(AppConfig::default());
        assert!(a.manager.current_model().is_none());
        assert!(b.manager.current_model().is_none());
    }
}
