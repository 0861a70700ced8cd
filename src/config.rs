// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for m3embed
//!
//! Loads configuration from .m3embedrc.toml in current directory or ~/.config/m3embed/config.toml

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::embedding::postprocess::DEFAULT_SPECIAL_TOKEN_IDS;
use crate::embedding::TokenId;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Collaborator implementation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Command,
    Dummy,
}

/// Post-processing policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Token ids excluded from lexical weights
    pub special_token_ids: Option<Vec<TokenId>>,
    /// Lexical weights must be strictly greater than this value
    pub min_weight: Option<f32>,
    /// Fixed dense dimension to enforce, if any
    pub dense_dim: Option<usize>,
    /// Whether a zero-length tokenization is passed to the model
    pub allow_empty: Option<bool>,
}

impl PostProcessConfig {
    /// Get special token ids (defaults to [PAD], [UNK], [CLS], [SEP] = 0..=3)
    pub fn special_token_ids(&self) -> &[TokenId] {
        self.special_token_ids
            .as_deref()
            .unwrap_or(&DEFAULT_SPECIAL_TOKEN_IDS[..])
    }

    /// Get weight threshold (defaults to 0.0)
    pub fn min_weight(&self) -> f32 {
        self.min_weight.unwrap_or(0.0)
    }

    /// Get empty input policy (defaults to false)
    pub fn allow_empty(&self) -> bool {
        self.allow_empty.unwrap_or(false)
    }
}

/// Tokenizer collaborator configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Provider type (command, dummy)
    pub provider: Option<ProviderType>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vocabulary size for the dummy provider
    pub vocab_size: Option<u32>,
}

impl TokenizerConfig {
    /// Get provider type (defaults to Command)
    pub fn provider(&self) -> ProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get command (defaults to "m3-tokenizer")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("m3-tokenizer")
    }

    /// Get dummy vocabulary size (defaults to 250002, the BGE-M3 vocabulary)
    pub fn vocab_size(&self) -> u32 {
        self.vocab_size.unwrap_or(250_002)
    }
}

/// Inference backend configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider type (command, dummy)
    pub provider: Option<ProviderType>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Model identifier passed to the backend
    pub model: Option<String>,
    /// Dense dimension for the dummy provider
    pub dense_dim: Option<usize>,
    /// Sparse hidden dimension for the dummy provider
    pub sparse_dim: Option<usize>,
    /// Multi-vector dimension for the dummy provider
    pub colbert_dim: Option<usize>,
}

impl ModelConfig {
    /// Get provider type (defaults to Command)
    pub fn provider(&self) -> ProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get command (defaults to "m3-model")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("m3-model")
    }

    /// Get model identifier (defaults to "BAAI/bge-m3")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("BAAI/bge-m3")
    }

    /// Get dummy dense dimension (defaults to 1024)
    pub fn dense_dim(&self) -> usize {
        self.dense_dim.unwrap_or(1024)
    }

    /// Get dummy sparse hidden dimension (defaults to 1)
    pub fn sparse_dim(&self) -> usize {
        self.sparse_dim.unwrap_or(1)
    }

    /// Get dummy multi-vector dimension (defaults to 1024)
    pub fn colbert_dim(&self) -> usize {
        self.colbert_dim.unwrap_or(1024)
    }
}

/// Tolerances for comparing against reference embeddings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Minimum cosine similarity for dense vectors
    pub dense_min_similarity: Option<f64>,
    /// Minimum cosine similarity for each multi-vector
    pub colbert_min_similarity: Option<f64>,
    /// Maximum absolute difference per lexical weight
    pub sparse_max_abs_diff: Option<f64>,
}

impl CompareConfig {
    /// Get dense similarity floor (defaults to 0.9999)
    pub fn dense_min_similarity(&self) -> f64 {
        self.dense_min_similarity.unwrap_or(0.9999)
    }

    /// Get multi-vector similarity floor (defaults to 0.9999)
    pub fn colbert_min_similarity(&self) -> f64 {
        self.colbert_min_similarity.unwrap_or(0.9999)
    }

    /// Get lexical weight tolerance (defaults to 1e-3)
    pub fn sparse_max_abs_diff(&self) -> f64 {
        self.sparse_max_abs_diff.unwrap_or(1e-3)
    }
}

/// Configuration loaded from .m3embedrc.toml or ~/.config/m3embed/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    #[serde(default)]
    pub postprocess: PostProcessConfig,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub compare: CompareConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .m3embedrc.toml in current directory
    /// 2. ~/.config/m3embed/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(&PathBuf::from(".m3embedrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("m3embed").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Apply M3EMBED_* environment variable overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(ids) = read_env("M3EMBED_SPECIAL_TOKENS")? {
            self.postprocess.special_token_ids = Some(parse_token_list(&ids)?);
        }
        if let Some(raw) = read_env("M3EMBED_MIN_WEIGHT")? {
            let value = raw
                .parse::<f32>()
                .with_context(|| format!("Invalid M3EMBED_MIN_WEIGHT value: {}", raw))?;
            self.postprocess.min_weight = Some(value);
        }
        if let Some(command) = read_env("M3EMBED_TOKENIZER_COMMAND")? {
            self.tokenizer.command = Some(command);
            self.tokenizer.provider = Some(ProviderType::Command);
        }
        if let Some(command) = read_env("M3EMBED_MODEL_COMMAND")? {
            self.model.command = Some(command);
            self.model.provider = Some(ProviderType::Command);
        }
        Ok(())
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format
            .as_ref()
            .and_then(|s| match s.to_lowercase().as_str() {
                "json" => Some(ConfigOutputFormat::Json),
                "text" => Some(ConfigOutputFormat::Text),
                _ => None,
            })
    }
}

fn read_env(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

/// Parses a comma-separated token id list such as "0, 1, 2, 3".
pub fn parse_token_list(raw: &str) -> Result<Vec<TokenId>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<TokenId>()
                .with_context(|| format!("Invalid token id: {}", s))
        })
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("Token id list is empty: '{}'", raw);
    }
    Ok(ids)
}
