// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns tokenizer and model output into embeddings
//!
//! This module reorders tokenizer output, builds model input, and reduces the
//! model's raw tensors into a dense vector, sparse lexical weights and
//! per-token multi-vectors.

pub mod compare;
pub mod embedder;
pub mod postprocess;
pub mod provider;
pub mod result;
pub mod tensor;
pub mod tokens;

pub use compare::{compare, cosine_similarity, ComparisonReport, Tolerances};
pub use embedder::M3Embedder;
pub use postprocess::{PostProcessor, SpecialTokenSet, DEFAULT_SPECIAL_TOKEN_IDS};
pub use provider::{
    CommandBackend, CommandTokenizer, DummyBackend, DummyTokenizer, InferenceBackend, Tokenizer,
};
pub use result::{EmbeddingResult, LexicalWeights};
pub use tensor::ModelOutput;
pub use tokens::{ModelInput, RawTokenization, Token, TokenId, TokenSequence};
