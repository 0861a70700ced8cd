// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token ordering and model input construction.
//!
//! Tokenizers may emit `(token, position)` pairs in any order. This module
//! restores sequence order and builds the `[1, N]` id and mask rows fed to the
//! inference backend.

use serde::Serialize;
use tracing::debug;

use crate::errors::{EmbedError, Result};

/// Integer token id, matching the int64 input dtype of the model.
pub type TokenId = i64;

/// Unordered tokenizer output: parallel token-id and position arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTokenization {
    pub tokens: Vec<TokenId>,
    pub positions: Vec<i64>,
}

impl RawTokenization {
    pub fn new(tokens: Vec<TokenId>, positions: Vec<i64>) -> Self {
        Self { tokens, positions }
    }
}

/// A token at a known sequence position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub id: TokenId,
    pub position: usize,
}

/// Tokens sorted by ascending position, positions exactly `0..N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    tokens: Vec<Token>,
}

impl TokenSequence {
    /// Restores positional order of a raw tokenization.
    ///
    /// Positions must form a permutation of `0..N`. Out-of-range, negative or
    /// duplicate positions fail with [`EmbedError::MalformedTokenization`];
    /// since duplicates are rejected, no tie-breaking rule is ever needed.
    pub fn reorder(raw: &RawTokenization) -> Result<Self> {
        if raw.tokens.len() != raw.positions.len() {
            return Err(EmbedError::malformed(format!(
                "token array has {} entries but position array has {}",
                raw.tokens.len(),
                raw.positions.len()
            )));
        }

        let len = raw.tokens.len();
        let mut slots: Vec<Option<TokenId>> = vec![None; len];

        for (&id, &position) in raw.tokens.iter().zip(&raw.positions) {
            let index = usize::try_from(position)
                .ok()
                .filter(|&p| p < len)
                .ok_or_else(|| {
                    EmbedError::malformed(format!("position {} outside 0..{}", position, len))
                })?;

            if slots[index].is_some() {
                return Err(EmbedError::malformed(format!(
                    "duplicate position {}",
                    position
                )));
            }
            slots[index] = Some(id);
        }

        // N distinct in-range positions over N slots fill every slot.
        let tokens = slots
            .into_iter()
            .enumerate()
            .map(|(position, id)| {
                id.map(|id| Token { id, position })
                    .ok_or_else(|| EmbedError::malformed(format!("missing position {}", position)))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(tokens = tokens.len(), "reordered tokenizer output");
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Token ids in sequence order.
    pub fn ids(&self) -> Vec<TokenId> {
        self.tokens.iter().map(|t| t.id).collect()
    }
}

/// Model input for a single sequence: ids and attention mask, both length N.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelInput {
    pub input_ids: Vec<TokenId>,
    pub attention_mask: Vec<i64>,
}

impl ModelInput {
    /// Builds ids and an all-ones mask. No padding or truncation is applied.
    pub fn from_sequence(sequence: &TokenSequence) -> Self {
        let input_ids = sequence.ids();
        let attention_mask = vec![1; input_ids.len()];
        Self {
            input_ids,
            attention_mask,
        }
    }

    /// Sequence length N.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Whether position `index` takes part in the output (mask value 1).
    pub fn is_attended(&self, index: usize) -> bool {
        self.attention_mask.get(index).copied() == Some(1)
    }

    /// Number of attended positions.
    pub fn attended_count(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }

    pub(crate) fn check_mask(&self, component: &'static str) -> Result<()> {
        if self.attention_mask.len() != self.input_ids.len() {
            return Err(EmbedError::shape(
                component,
                "attention_mask",
                format!("[1, {}]", self.input_ids.len()),
                &[1, self.attention_mask.len()],
            ));
        }
        Ok(())
    }
}
