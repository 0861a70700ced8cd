// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text to embeddings: tokenizer, reordering, inference and post-processing
//! wired together.

use rayon::prelude::*;
use tracing::debug;

use super::postprocess::PostProcessor;
use super::provider::{
    CommandBackend, CommandTokenizer, DummyBackend, DummyTokenizer, InferenceBackend, Tokenizer,
};
use super::result::EmbeddingResult;
use super::tokens::{ModelInput, RawTokenization, TokenSequence};
use crate::config::{Config, ProviderType};
use crate::errors::{EmbedError, Result};

/// Produces dense, sparse and multi-vector embeddings for text.
///
/// Holds no per-call state; a single instance can serve concurrent callers
/// as long as its collaborators can.
pub struct M3Embedder<T = Box<dyn Tokenizer>, B = Box<dyn InferenceBackend>> {
    tokenizer: T,
    backend: B,
    processor: PostProcessor,
    allow_empty: bool,
}

impl M3Embedder {
    /// Builds an embedder with the collaborators selected in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tokenizer: Box<dyn Tokenizer> = match config.tokenizer.provider() {
            ProviderType::Command => Box::new(CommandTokenizer::new(config.tokenizer.command())),
            ProviderType::Dummy => Box::new(DummyTokenizer::new(config.tokenizer.vocab_size())),
        };

        let backend: Box<dyn InferenceBackend> = match config.model.provider() {
            ProviderType::Command => Box::new(CommandBackend::new(
                config.model.command(),
                config.model.model(),
            )),
            ProviderType::Dummy => {
                let model = &config.model;
                if model.dense_dim() == 0 || model.sparse_dim() == 0 || model.colbert_dim() == 0 {
                    return Err(EmbedError::Config(
                        "dummy model dimensions must be non-zero".to_string(),
                    ));
                }
                Box::new(DummyBackend::new(
                    model.dense_dim(),
                    model.sparse_dim(),
                    model.colbert_dim(),
                ))
            }
        };

        Ok(Self::new(
            tokenizer,
            backend,
            PostProcessor::from_config(&config.postprocess)?,
        )
        .allow_empty(config.postprocess.allow_empty()))
    }
}

impl<T: Tokenizer, B: InferenceBackend> M3Embedder<T, B> {
    pub fn new(tokenizer: T, backend: B, processor: PostProcessor) -> Self {
        Self {
            tokenizer,
            backend,
            processor,
            allow_empty: false,
        }
    }

    /// When false (the default), a zero-length tokenization fails with
    /// [`EmbedError::EmptyInput`] before the model is called.
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn processor(&self) -> &PostProcessor {
        &self.processor
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Tokenizes `text` and builds the model input without running the model.
    pub fn prepare(&self, text: &str) -> Result<ModelInput> {
        let raw = self.tokenizer.tokenize(text)?;
        self.prepare_tokenization(&raw)
    }

    fn prepare_tokenization(&self, raw: &RawTokenization) -> Result<ModelInput> {
        let sequence = TokenSequence::reorder(raw)?;
        if sequence.is_empty() && !self.allow_empty {
            return Err(EmbedError::EmptyInput);
        }
        Ok(ModelInput::from_sequence(&sequence))
    }

    /// Encodes one text into all three embedding kinds.
    pub fn encode(&self, text: &str) -> Result<EmbeddingResult> {
        let raw = self.tokenizer.tokenize(text)?;
        self.encode_tokenization(&raw)
    }

    /// Encodes already-tokenized input.
    pub fn encode_tokenization(&self, raw: &RawTokenization) -> Result<EmbeddingResult> {
        let input = self.prepare_tokenization(raw)?;
        let output = self.backend.infer(&input)?;
        debug!(
            tokens = input.len(),
            dense = ?output.dense.shape(),
            sparse = ?output.sparse_weights.shape(),
            colbert = ?output.colbert.shape(),
            "model returned tensors"
        );
        self.processor.process(&input, &output)
    }

    /// Encodes texts in parallel. Results keep input order; the first
    /// failure aborts the batch.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }
}
