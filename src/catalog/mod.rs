//! Model catalog
//!
//! Discovers GGUF model artifacts in a local directory. Stateless: every scan
//! re-reads the filesystem, so listings are never stale.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::model::ModelDescriptor;

/// Errors surfaced by catalog scans
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read models directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid models directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Scans a directory for model artifacts and extracts their metadata.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// The directory this catalog scans.
    pub fn models_dir(&self) -> &std::path::Path {
        &self.models_dir
    }

    /// List all `.gguf` artifacts in the models directory.
    ///
    /// An empty directory yields an empty vec, not an error; an unreadable or
    /// missing directory is an error. Results are sorted by filename so
    /// repeated scans are deterministic.
    pub fn scan(&self) -> Result<Vec<ModelDescriptor>, CatalogError> {
        if !self.models_dir.is_dir() {
            return Err(CatalogError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("models directory not found: {}", self.models_dir.display()),
            )));
        }

        let pattern = self.models_dir.join("*.gguf");
        let pattern = pattern.to_string_lossy();

        let mut models = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| CatalogError::Io(e.into_error()))?;
            match ModelDescriptor::from_path(&path) {
                Ok(descriptor) => models.push(descriptor),
                Err(e) => {
                    // File vanished between glob and stat; skip it.
                    tracing::warn!("skipping unreadable artifact {}: {}", path.display(), e);
                }
            }
        }

        models.sort_by(|a, b| a.filename.cmp(&b.filename));
        tracing::debug!("catalog scan found {} models", models.len());
        Ok(models)
    }
}
