// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-processing of raw model tensors into dense, sparse and multi-vector
//! embeddings.
//!
//! The three extractors run independently over their own tensor but share the
//! attention mask of the [`ModelInput`]. Any shape violation aborts the whole
//! call; no partial result is ever returned.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::collections::BTreeSet;
use tracing::debug;

use super::result::{EmbeddingResult, LexicalWeights};
use super::tensor::ModelOutput;
use super::tokens::{ModelInput, TokenId};
use crate::config::PostProcessConfig;
use crate::errors::{EmbedError, Result};

const DENSE: &str = "dense extractor";
const SPARSE: &str = "sparse aggregator";
const MULTI_VECTOR: &str = "multi-vector extractor";

/// Reserved token ids ([PAD], [UNK], [CLS], [SEP]) of the BGE-M3 vocabulary.
pub const DEFAULT_SPECIAL_TOKEN_IDS: [TokenId; 4] = [0, 1, 2, 3];

/// Reserved token ids excluded from sparse aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokenSet(BTreeSet<TokenId>);

impl SpecialTokenSet {
    pub fn new(ids: impl IntoIterator<Item = TokenId>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: TokenId) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SpecialTokenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SPECIAL_TOKEN_IDS)
    }
}

/// Stateless post-processor. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    special_tokens: SpecialTokenSet,
    min_weight: f32,
    dense_dim: Option<usize>,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(SpecialTokenSet::default())
    }
}

impl PostProcessor {
    pub fn new(special_tokens: SpecialTokenSet) -> Self {
        Self {
            special_tokens,
            min_weight: 0.0,
            dense_dim: None,
        }
    }

    /// Builds a processor from `[postprocess]`, rejecting a threshold that
    /// would admit non-positive weights.
    pub fn from_config(config: &PostProcessConfig) -> Result<Self> {
        let min_weight = config.min_weight();
        if !min_weight.is_finite() || min_weight < 0.0 {
            return Err(EmbedError::Config(format!(
                "min_weight must be a finite, non-negative number (got {})",
                min_weight
            )));
        }

        let special_tokens = SpecialTokenSet::new(config.special_token_ids().iter().copied());
        let processor = Self::new(special_tokens)
            .with_min_weight(min_weight)
            .with_dense_dim(config.dense_dim);
        debug!(
            special_tokens = ?processor.special_tokens.iter().collect::<Vec<_>>(),
            min_weight = processor.min_weight(),
            "configured post-processor"
        );
        Ok(processor)
    }

    /// Sparse weights must be strictly greater than `min_weight` to be kept.
    pub fn with_min_weight(mut self, min_weight: f32) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Requires every dense vector to have exactly `dim` values.
    pub fn with_dense_dim(mut self, dim: Option<usize>) -> Self {
        self.dense_dim = dim;
        self
    }

    pub fn special_tokens(&self) -> &SpecialTokenSet {
        &self.special_tokens
    }

    pub fn min_weight(&self) -> f32 {
        self.min_weight
    }

    /// Returns the single batch row of the dense tensor, unchanged.
    pub fn extract_dense(&self, dense: &Array2<f32>) -> Result<Vec<f32>> {
        let (batch, dim) = dense.dim();
        let expected = match self.dense_dim {
            Some(d) => format!("[1, {}]", d),
            None => "[1, D] with D > 0".to_string(),
        };
        if batch != 1 || dim == 0 || self.dense_dim.is_some_and(|d| d != dim) {
            return Err(EmbedError::shape(DENSE, "dense_vecs", expected, dense.shape()));
        }
        Ok(dense.row(0).to_vec())
    }

    /// Reduces `[1, N, H]` sparse weights to one weight per distinct token id.
    ///
    /// Each attended, non-special position contributes the maximum over its
    /// hidden dimension; weights at or below the threshold are dropped and a
    /// repeated id keeps its largest weight.
    pub fn aggregate_sparse(
        &self,
        input: &ModelInput,
        sparse: &Array3<f32>,
    ) -> Result<LexicalWeights> {
        input.check_mask(SPARSE)?;
        let plane = sequence_plane(SPARSE, "sparse_weights", input.len(), sparse)?;

        let mut weights = LexicalWeights::new();
        for (i, row) in plane.outer_iter().enumerate() {
            if !input.is_attended(i) {
                continue;
            }
            let id = input.input_ids[i];
            if self.special_tokens.contains(id) {
                continue;
            }
            let weight = max_propagating_nan(row.iter().copied());
            if weight > self.min_weight {
                weights.upsert_max(id, weight);
            }
        }

        debug!(tokens = weights.len(), "aggregated lexical weights");
        Ok(weights)
    }

    /// Collects one vector per attended position, in sequence order.
    ///
    /// Special tokens are kept here, unlike in sparse aggregation.
    pub fn extract_multi_vectors(
        &self,
        input: &ModelInput,
        colbert: &Array3<f32>,
    ) -> Result<Vec<Vec<f32>>> {
        input.check_mask(MULTI_VECTOR)?;
        let plane = sequence_plane(MULTI_VECTOR, "colbert_vecs", input.len(), colbert)?;

        let vectors: Vec<Vec<f32>> = plane
            .outer_iter()
            .enumerate()
            .filter(|(i, _)| input.is_attended(*i))
            .map(|(_, row)| row.to_vec())
            .collect();

        debug!(vectors = vectors.len(), "extracted multi-vectors");
        Ok(vectors)
    }

    /// Runs all three extractors and assembles the result.
    pub fn process(&self, input: &ModelInput, output: &ModelOutput) -> Result<EmbeddingResult> {
        let dense = self.extract_dense(&output.dense)?;
        let lexical_weights = self.aggregate_sparse(input, &output.sparse_weights)?;
        let multi_vectors = self.extract_multi_vectors(input, &output.colbert)?;

        Ok(EmbeddingResult {
            dense,
            lexical_weights,
            multi_vectors,
            token_ids: input.input_ids.clone(),
        })
    }
}

/// Maximum of `values`, NaN if any value is NaN.
///
/// `f32::max` ignores NaN; a NaN weight must instead fail the threshold.
fn max_propagating_nan(values: impl Iterator<Item = f32>) -> f32 {
    values.fold(f32::NEG_INFINITY, |max, v| {
        if max.is_nan() || v.is_nan() {
            f32::NAN
        } else {
            max.max(v)
        }
    })
}

/// Validates a `[1, N, *]` tensor and returns its `[N, *]` plane.
fn sequence_plane<'a>(
    component: &'static str,
    tensor_name: &'static str,
    len: usize,
    tensor: &'a Array3<f32>,
) -> Result<ArrayView2<'a, f32>> {
    let (batch, positions, width) = tensor.dim();
    if batch != 1 || positions != len || (len > 0 && width == 0) {
        return Err(EmbedError::shape(
            component,
            tensor_name,
            format!("[1, {}, *] with a non-empty last dimension", len),
            tensor.shape(),
        ));
    }
    Ok(tensor.index_axis(Axis(0), 0))
}
