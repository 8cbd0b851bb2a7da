//! Model types
//!
//! Metadata for model artifacts discovered on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Known model vendor families, inferred from the artifact filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    Qwen,
    DeepSeek,
    Llama,
    Mistral,
    Phi,
    /// No known vendor keyword matched
    Generic,
}

/// Ordered keyword table for family classification. First match wins.
const FAMILY_KEYWORDS: &[(&str, ModelFamily)] = &[
    ("qwen", ModelFamily::Qwen),
    ("deepseek", ModelFamily::DeepSeek),
    ("llama", ModelFamily::Llama),
    ("mistral", ModelFamily::Mistral),
    ("phi", ModelFamily::Phi),
];

impl ModelFamily {
    /// Classify a filename by case-insensitive substring match against the
    /// known vendor keywords.
    pub fn classify(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        for (keyword, family) in FAMILY_KEYWORDS {
            if lower.contains(keyword) {
                return *family;
            }
        }
        ModelFamily::Generic
    }

    /// Short human-readable description of the family.
    pub fn description(&self) -> &'static str {
        match self {
            ModelFamily::Qwen => "Qwen model - Alibaba's large language model",
            ModelFamily::DeepSeek => "DeepSeek model - Advanced coding and reasoning model",
            ModelFamily::Llama => "Llama model - Meta's open-source LLM",
            ModelFamily::Mistral => "Mistral model - Efficient small language model",
            ModelFamily::Phi => "Phi model - Microsoft's compact LM",
            ModelFamily::Generic => "General purpose language model",
        }
    }
}

/// Immutable snapshot of a discovered model artifact.
///
/// Recomputed on every catalog scan; there is no persistent identity across
/// scans beyond the filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Artifact filename, e.g. `qwen2.5-3b-instruct-q4_k_m.gguf`
    pub filename: String,
    /// Absolute path to the artifact
    pub path: PathBuf,
    /// Artifact size in bytes
    pub size_bytes: u64,
    /// Inferred vendor family
    pub family: ModelFamily,
}

impl ModelDescriptor {
    /// Build a descriptor for an artifact on disk.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let family = ModelFamily::classify(&filename);
        Ok(Self {
            filename,
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            family,
        })
    }

    /// Artifact size in gigabytes, rounded to two decimals.
    pub fn size_gb(&self) -> f64 {
        (self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0) * 100.0).round() / 100.0
    }

    /// Human-readable description inferred from the filename.
    pub fn description(&self) -> &'static str {
        self.family.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_families() {
        assert_eq!(
            ModelFamily::classify("Qwen2.5-3B-Instruct-Q4_K_M.gguf"),
            ModelFamily::Qwen
        );
        assert_eq!(
            ModelFamily::classify("deepseek-coder-6.7b.gguf"),
            ModelFamily::DeepSeek
        );
        assert_eq!(
            ModelFamily::classify("Meta-Llama-3-8B.gguf"),
            ModelFamily::Llama
        );
        assert_eq!(
            ModelFamily::classify("mistral-7b-v0.3.gguf"),
            ModelFamily::Mistral
        );
        assert_eq!(ModelFamily::classify("Phi-3-mini.gguf"), ModelFamily::Phi);
    }

    #[test]
    fn test_classify_first_match_wins() {
        // "qwen" precedes "llama" in the keyword table
        assert_eq!(
            ModelFamily::classify("qwen-llama-hybrid.gguf"),
            ModelFamily::Qwen
        );
        assert_eq!(
            ModelFamily::classify("deepseek-llama-distill.gguf"),
            ModelFamily::DeepSeek
        );
    }

    #[test]
    fn test_classify_unknown_is_generic() {
        assert_eq!(ModelFamily::classify("tiny.gguf"), ModelFamily::Generic);
        assert_eq!(ModelFamily::classify(""), ModelFamily::Generic);
    }

    #[test]
    fn test_descriptions_are_nonempty() {
        for family in [
            ModelFamily::Qwen,
            ModelFamily::DeepSeek,
            ModelFamily::Llama,
            ModelFamily::Mistral,
            ModelFamily::Phi,
            ModelFamily::Generic,
        ] {
            assert!(!family.description().is_empty());
        }
    }

    #[test]
    fn test_size_gb_rounding() {
        let descriptor = ModelDescriptor {
            filename: "tiny.gguf".to_string(),
            path: PathBuf::from("/models/tiny.gguf"),
            size_bytes: 858_993_459, // ~0.8 GB
            family: ModelFamily::Generic,
        };
        assert_eq!(descriptor.size_gb(), 0.8);
    }
}
