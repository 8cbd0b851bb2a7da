//! Configuration types
//!
//! Server configuration: model directory, engine executable and transport
//! tuning knobs.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory scanned for `.gguf` model artifacts
    pub models_dir: PathBuf,
    /// Path to the external inference engine executable
    pub engine_path: PathBuf,
    /// Context window size passed to the engine
    pub context_size: u32,
    /// Line that marks the end of a generation turn on the engine transport.
    /// Engines vary in termination signaling, so this is configuration.
    pub sentinel: String,
    /// Upper bound on a single transport read, in seconds
    pub read_timeout_secs: u64,
    /// Pacing delay between chunks in degraded-mode stream emulation, in ms
    pub stream_delay_ms: u64,
    /// Default maximum tokens per generation
    pub max_tokens: u32,
    /// Default sampling temperature
    pub temperature: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            engine_path: PathBuf::from("./llama.cpp/main"),
            context_size: 4096,
            sentinel: "###".to_string(),
            read_timeout_secs: 120,
            stream_delay_ms: 10,
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

/// Models directory under the platform data dir, `./models` as a last resort.
fn default_models_dir() -> PathBuf {
    ProjectDirs::from("", "", "localchat")
        .map(|dirs| dirs.data_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from("./models"))
}

/// Default config file location under the platform config dir.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("", "", "localchat")
        .map(|dirs| dirs.config_dir().join("config.json"))
        .unwrap_or_else(|| PathBuf::from("./localchat.json"))
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// Returns defaults if the file doesn't exist or is corrupted.
    pub fn load(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Invalid config file, using defaults: {}", e);
                    AppConfig::default()
                }
            },
            Err(_) => {
                tracing::info!("Config file not found, using defaults");
                AppConfig::default()
            }
        };
        config.validate();
        config
    }

    /// Clamp all parameters into acceptable ranges.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.context_size = self.context_size.clamp(512, 131_072);
        self.max_tokens = self.max_tokens.max(1);

        // Can't generate more than the context allows
        if self.max_tokens > self.context_size {
            self.max_tokens = self.context_size / 2;
        }

        if self.sentinel.trim().is_empty() {
            self.sentinel = "###".to_string();
        }

        if self.read_timeout_secs == 0 {
            self.read_timeout_secs = 120;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.context_size, 4096);
        assert_eq!(config.sentinel, "###");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.read_timeout_secs, 120);
    }

    #[test]
    fn test_validation_clamps() {
        let mut config = AppConfig::default();
        config.temperature = 5.0;
        config.context_size = 16;
        config.max_tokens = 0;
        config.sentinel = "  ".to_string();
        config.read_timeout_secs = 0;
        config.validate();
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.context_size, 512);
        assert!(config.max_tokens >= 1);
        assert_eq!(config.sentinel, "###");
        assert_eq!(config.read_timeout_secs, 120);
    }

    #[test]
    fn test_max_tokens_capped_by_context() {
        let mut config = AppConfig::default();
        config.context_size = 2048;
        config.max_tokens = 100_000;
        config.validate();
        assert_eq!(config.max_tokens, 1024);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: AppConfig = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(config.context_size, deserialized.context_size);
        assert_eq!(config.sentinel, deserialized.sentinel);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config.context_size, AppConfig::default().context_size);
    }

    #[test]
    fn test_load_corrupt_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let config = AppConfig::load(&path);
        assert_eq!(config.sentinel, "###");
    }
}
