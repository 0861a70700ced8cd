// SPDX-License-Identifier: MIT OR Apache-2.0

use m3embed::embedding::{
    EmbeddingResult, M3Embedder, ModelInput, ModelOutput, PostProcessor, RawTokenization,
    SpecialTokenSet, TokenSequence,
};
use m3embed::errors::EmbedError;
use ndarray::{Array2, Array3};

/// Sparse tensor `[1, N, H]` where position `i` has maximum `maxima[i]`.
fn sparse_tensor(maxima: &[f32], hidden: usize) -> Array3<f32> {
    Array3::from_shape_fn((1, maxima.len(), hidden), |(_, i, h)| {
        if h == hidden / 2 {
            maxima[i]
        } else {
            maxima[i] - 0.25 * (h + 1) as f32
        }
    })
}

fn output(len: usize, maxima: &[f32]) -> ModelOutput {
    ModelOutput {
        dense: Array2::from_shape_fn((1, 6), |(_, d)| d as f32 / 6.0),
        sparse_weights: sparse_tensor(maxima, 5),
        colbert: Array3::from_shape_fn((1, len, 3), |(_, i, d)| (i * 3 + d) as f32),
    }
}

#[test]
fn cls_sep_excluded_and_duplicates_reduced_by_max() {
    let input = ModelInput {
        input_ids: vec![2, 501, 501, 3],
        attention_mask: vec![1, 1, 1, 1],
    };
    let processor = PostProcessor::new(SpecialTokenSet::new([0, 1, 2, 3]));

    let result = processor
        .process(&input, &output(4, &[0.0, 0.8, 0.3, 0.0]))
        .unwrap();

    let json = serde_json::to_string(&result.lexical_weights).unwrap();
    assert_eq!(json, r#"{"501":0.8}"#);
    assert_ne!(result.lexical_weights.get(501), Some(0.8 + 0.3));
}

#[test]
fn short_sparse_tensor_is_a_shape_mismatch() {
    let input = ModelInput {
        input_ids: vec![2, 501, 501, 3],
        attention_mask: vec![1, 1, 1, 1],
    };
    let mut bad = output(4, &[0.0, 0.8, 0.3]);
    bad.colbert = Array3::zeros((1, 4, 3));

    let err = PostProcessor::default().process(&input, &bad).unwrap_err();
    assert!(matches!(
        err,
        EmbedError::ShapeMismatch {
            tensor: "sparse_weights",
            ..
        }
    ));
}

#[test]
fn duplicate_positions_are_malformed() {
    let raw = RawTokenization::new(vec![2, 10, 11, 3], vec![0, 0, 2, 3]);
    assert!(matches!(
        TokenSequence::reorder(&raw),
        Err(EmbedError::MalformedTokenization { .. })
    ));
}

#[test]
fn multi_vectors_skip_masked_positions_in_order() {
    let input = ModelInput {
        input_ids: vec![2, 40, 41, 3],
        attention_mask: vec![1, 1, 0, 1],
    };
    let result = PostProcessor::default()
        .process(&input, &output(4, &[0.5, 0.5, 0.5, 0.5]))
        .unwrap();

    assert_eq!(result.multi_vectors.len(), input.attended_count());
    assert_eq!(
        result.multi_vectors,
        vec![
            vec![0.0, 1.0, 2.0],
            vec![3.0, 4.0, 5.0],
            vec![9.0, 10.0, 11.0]
        ]
    );
    // Masked position 2 (id 41) contributes no lexical weight.
    assert!(!result.lexical_weights.contains(41));
    assert!(result.lexical_weights.contains(40));
}

#[test]
fn dense_vector_is_passed_through() {
    let input = ModelInput {
        input_ids: vec![7],
        attention_mask: vec![1],
    };
    let result = PostProcessor::default()
        .process(&input, &output(1, &[0.1]))
        .unwrap();
    let expected: Vec<f32> = (0..6).map(|d| d as f32 / 6.0).collect();
    assert_eq!(result.dense, expected);
}

#[test]
fn serialized_output_is_byte_identical_across_runs() {
    let input = ModelInput {
        input_ids: vec![2, 9, 8, 9, 7, 3],
        attention_mask: vec![1; 6],
    };
    let tensors = output(6, &[0.2, 0.4, 0.6, 0.9, 0.1, 0.3]);
    let processor = PostProcessor::default();

    let runs: Vec<String> = (0..3)
        .map(|_| serde_json::to_string(&processor.process(&input, &tensors).unwrap()).unwrap())
        .collect();
    assert!(runs.windows(2).all(|pair| pair[0] == pair[1]));

    let parsed: EmbeddingResult = serde_json::from_str(&runs[0]).unwrap();
    assert_eq!(parsed.lexical_weights.get(9), Some(0.9));
}

#[test]
fn embedder_is_shareable_across_threads() {
    let config: m3embed::config::Config = toml::from_str(
        r#"
[tokenizer]
provider = "dummy"

[model]
provider = "dummy"
dense_dim = 12
colbert_dim = 4
"#,
    )
    .unwrap();
    let embedder = M3Embedder::from_config(&config).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let embedder = &embedder;
                scope.spawn(move || embedder.encode(&format!("thread {} text", i)).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().dense_dim(), 12);
        }
    });
}
