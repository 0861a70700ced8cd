// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding result types and their serialized record format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::tokens::TokenId;

/// Sparse lexical weights keyed by integer token id.
///
/// Keys are kept as integers and only become decimal strings when the map is
/// serialized, so `"0501"`-style key collisions cannot happen. The ordered map
/// keeps serialized output byte-identical across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LexicalWeights(BTreeMap<TokenId, f32>);

impl LexicalWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `weight`, keeping the larger value when `id` is already present.
    pub fn upsert_max(&mut self, id: TokenId, weight: f32) {
        self.0
            .entry(id)
            .and_modify(|existing| *existing = existing.max(weight))
            .or_insert(weight);
    }

    pub fn get(&self, id: TokenId) -> Option<f32> {
        self.0.get(&id).copied()
    }

    pub fn contains(&self, id: TokenId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, f32)> + '_ {
        self.0.iter().map(|(&id, &weight)| (id, weight))
    }

    /// The `n` heaviest tokens, heaviest first; ties break on ascending id.
    pub fn top(&self, n: usize) -> Vec<(TokenId, f32)> {
        let mut entries: Vec<(TokenId, f32)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

impl FromIterator<(TokenId, f32)> for LexicalWeights {
    fn from_iter<I: IntoIterator<Item = (TokenId, f32)>>(iter: I) -> Self {
        let mut weights = Self::new();
        for (id, weight) in iter {
            weights.upsert_max(id, weight);
        }
        weights
    }
}

/// Dense, sparse and multi-vector embeddings for one input sequence.
///
/// Serializes to the `dense_vecs` / `lexical_weights` / `colbert_vecs` record
/// used for reference embedding files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    #[serde(rename = "dense_vecs")]
    pub dense: Vec<f32>,
    pub lexical_weights: LexicalWeights,
    #[serde(rename = "colbert_vecs")]
    pub multi_vectors: Vec<Vec<f32>>,
    /// Ordered token ids the result was computed from. Not part of the record.
    #[serde(skip)]
    pub token_ids: Vec<TokenId>,
}

impl EmbeddingResult {
    pub fn dense_dim(&self) -> usize {
        self.dense.len()
    }

    /// Dimension of the multi-vectors, if any were produced.
    pub fn colbert_dim(&self) -> Option<usize> {
        self.multi_vectors.first().map(Vec::len)
    }
}
