// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the embedding pipeline.

use thiserror::Error;

/// Errors produced while turning tokenizer and model output into embeddings.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Tokenizer positions are not a permutation of `0..N`.
    #[error("Malformed tokenization: {reason}")]
    MalformedTokenization { reason: String },

    /// A tensor does not have the shape implied by the model input.
    #[error("Shape mismatch in {component}: tensor '{tensor}' expected {expected}, got {actual}")]
    ShapeMismatch {
        component: &'static str,
        tensor: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Empty input: tokenizer produced no tokens")]
    EmptyInput,

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure inside an external tokenizer or inference backend.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl EmbedError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTokenization {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(
        component: &'static str,
        tensor: &'static str,
        expected: impl Into<String>,
        actual: &[usize],
    ) -> Self {
        Self::ShapeMismatch {
            component,
            tensor,
            expected: expected.into(),
            actual: format!("{:?}", actual),
        }
    }
}

/// Result type alias for embedding operations
pub type Result<T> = std::result::Result<T, EmbedError>;
