// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerance-based comparison of embeddings against reference output.

use serde::Serialize;

use super::result::EmbeddingResult;
use crate::config::CompareConfig;

/// Thresholds used by [`compare`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Dense cosine similarity must be strictly above this value.
    pub dense_min_similarity: f64,
    /// Each multi-vector's cosine similarity must be strictly above this value.
    pub colbert_min_similarity: f64,
    /// Each lexical weight must differ by strictly less than this value.
    pub sparse_max_abs_diff: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::from(&CompareConfig::default())
    }
}

impl From<&CompareConfig> for Tolerances {
    fn from(config: &CompareConfig) -> Self {
        Self {
            dense_min_similarity: config.dense_min_similarity(),
            colbert_min_similarity: config.colbert_min_similarity(),
            sparse_max_abs_diff: config.sparse_max_abs_diff(),
        }
    }
}

/// Outcome of comparing one result against its reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonReport {
    pub dense_similarity: f64,
    /// Human-readable description of every failed check.
    pub failures: Vec<String>,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compares `actual` against `reference` using `tolerances`.
pub fn compare(
    actual: &EmbeddingResult,
    reference: &EmbeddingResult,
    tolerances: &Tolerances,
) -> ComparisonReport {
    let mut report = ComparisonReport::default();

    if actual.dense.len() != reference.dense.len() {
        report.failures.push(format!(
            "dense dimension {} != reference {}",
            actual.dense.len(),
            reference.dense.len()
        ));
    } else {
        report.dense_similarity = cosine_similarity(&actual.dense, &reference.dense);
        if !(report.dense_similarity > tolerances.dense_min_similarity) {
            report.failures.push(format!(
                "dense similarity {:.10} not above {}",
                report.dense_similarity, tolerances.dense_min_similarity
            ));
        }
    }

    if actual.lexical_weights.len() != reference.lexical_weights.len() {
        report.failures.push(format!(
            "lexical weight count {} != reference {}",
            actual.lexical_weights.len(),
            reference.lexical_weights.len()
        ));
    }
    for (id, expected) in reference.lexical_weights.iter() {
        match actual.lexical_weights.get(id) {
            None => report
                .failures
                .push(format!("lexical weight for token {} missing", id)),
            Some(weight) => {
                let diff = (f64::from(weight) - f64::from(expected)).abs();
                if !(diff < tolerances.sparse_max_abs_diff) {
                    report.failures.push(format!(
                        "lexical weight for token {}: {} vs reference {}",
                        id, weight, expected
                    ));
                }
            }
        }
    }

    if actual.multi_vectors.len() != reference.multi_vectors.len() {
        report.failures.push(format!(
            "multi-vector count {} != reference {}",
            actual.multi_vectors.len(),
            reference.multi_vectors.len()
        ));
    } else {
        for (i, (a, r)) in actual
            .multi_vectors
            .iter()
            .zip(&reference.multi_vectors)
            .enumerate()
        {
            if a.len() != r.len() {
                report.failures.push(format!(
                    "multi-vector {} dimension {} != reference {}",
                    i,
                    a.len(),
                    r.len()
                ));
                continue;
            }
            let similarity = cosine_similarity(a, r);
            if !(similarity > tolerances.colbert_min_similarity) {
                report.failures.push(format!(
                    "multi-vector {} similarity {:.10} not above {}",
                    i, similarity, tolerances.colbert_min_similarity
                ));
            }
        }
    }

    report
}

/// Cosine similarity accumulated in f64. Zero vectors yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
