// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer and inference backend interfaces and implementations.
//!
//! Both collaborators are opaque: the pipeline only sees their tensor
//! contracts. Command providers shell out to an external process speaking
//! JSON over stdin/stdout; dummy providers are deterministic and offline.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Array3};
use serde_json::{Map, Value};
use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};
use tracing::debug;

use super::tensor::{array2_from_json, array3_from_json, ModelOutput};
use super::tokens::{ModelInput, RawTokenization, TokenId};

/// Token id the dummy tokenizer places at the start of every sequence.
pub const DUMMY_CLS_ID: TokenId = 2;
/// Token id the dummy tokenizer places at the end of every sequence.
pub const DUMMY_SEP_ID: TokenId = 3;
const DUMMY_FIRST_WORD_ID: u32 = 4;

/// Trait for tokenizers.
pub trait Tokenizer: Send + Sync {
    /// Returns the tokenizer identifier.
    fn name(&self) -> &str;

    /// Splits `text` into parallel token-id and position arrays.
    ///
    /// Positions may come back in any order.
    fn tokenize(&self, text: &str) -> Result<RawTokenization>;
}

/// Trait for inference backends: tensors in, tensors out.
pub trait InferenceBackend: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Runs the model on a single `[1, N]` input.
    fn infer(&self, input: &ModelInput) -> Result<ModelOutput>;
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn tokenize(&self, text: &str) -> Result<RawTokenization> {
        (**self).tokenize(text)
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn infer(&self, input: &ModelInput) -> Result<ModelOutput> {
        (**self).infer(input)
    }
}

/// Tokenizer that shells out to an external process.
///
/// Request: `{"text": ...}`. Response: `{"tokens": [...], "token_indices": [...]}`;
/// `positions` is accepted in place of `token_indices` and other fields are ignored.
pub struct CommandTokenizer {
    command: String,
}

impl CommandTokenizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Tokenizer for CommandTokenizer {
    fn name(&self) -> &str {
        &self.command
    }

    fn tokenize(&self, text: &str) -> Result<RawTokenization> {
        let payload = serde_json::json!({ "text": text });
        let response = run_json_command(&self.command, &payload)?;
        let obj = as_object(&response, "Tokenizer")?;

        let tokens = int_array(field(obj, &["tokens", "input_ids"], "Tokenizer")?, "tokens")?;
        let positions = int_array(
            field(obj, &["token_indices", "positions"], "Tokenizer")?,
            "token_indices",
        )?;

        Ok(RawTokenization::new(tokens, positions))
    }
}

/// Inference backend that shells out to an external process.
///
/// Request: `{"model", "input_ids": [[..]], "attention_mask": [[..]]}`.
/// Response: `{"dense_vecs": [[..]], "sparse_weights": [[[..]]], "colbert_vecs": [[[..]]]}`.
pub struct CommandBackend {
    command: String,
    model: String,
}

impl CommandBackend {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
        }
    }
}

impl InferenceBackend for CommandBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn infer(&self, input: &ModelInput) -> Result<ModelOutput> {
        let payload = serde_json::json!({
            "model": self.model,
            "input_ids": [input.input_ids],
            "attention_mask": [input.attention_mask],
        });
        let response = run_json_command(&self.command, &payload)?;
        let obj = as_object(&response, "Model")?;

        let dense = array2_from_json(field(obj, &["dense_vecs", "dense"], "Model")?, "dense_vecs")?;
        let sparse_weights = array3_from_json(
            field(obj, &["sparse_weights", "sparse"], "Model")?,
            "sparse_weights",
        )?;
        let colbert = array3_from_json(
            field(obj, &["colbert_vecs", "colbert"], "Model")?,
            "colbert_vecs",
        )?;

        debug!(
            dense = ?dense.shape(),
            sparse = ?sparse_weights.shape(),
            colbert = ?colbert.shape(),
            "model command returned tensors"
        );

        Ok(ModelOutput {
            dense,
            sparse_weights,
            colbert,
        })
    }
}

/// Dummy tokenizer: lowercase whitespace words hashed into the vocabulary,
/// wrapped in CLS/SEP, with positions emitted in reverse order.
pub struct DummyTokenizer {
    vocab_size: u32,
}

impl DummyTokenizer {
    pub fn new(vocab_size: u32) -> Self {
        Self {
            vocab_size: vocab_size.max(DUMMY_FIRST_WORD_ID + 1),
        }
    }

    /// Token id assigned to `word`.
    pub fn word_id(&self, word: &str) -> TokenId {
        let hash = blake3::hash(word.to_lowercase().as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&hash.as_bytes()[..4]);
        let span = self.vocab_size - DUMMY_FIRST_WORD_ID;
        TokenId::from(DUMMY_FIRST_WORD_ID + u32::from_le_bytes(bytes) % span)
    }
}

impl Tokenizer for DummyTokenizer {
    fn name(&self) -> &str {
        "dummy"
    }

    fn tokenize(&self, text: &str) -> Result<RawTokenization> {
        let mut ids = vec![DUMMY_CLS_ID];
        ids.extend(text.split_whitespace().map(|word| self.word_id(word)));
        ids.push(DUMMY_SEP_ID);

        let (tokens, positions): (Vec<TokenId>, Vec<i64>) = ids
            .into_iter()
            .enumerate()
            .rev()
            .map(|(position, id)| (id, position as i64))
            .unzip();

        Ok(RawTokenization::new(tokens, positions))
    }
}

/// Dummy backend producing deterministic pseudo-random tensors.
///
/// Dense and multi-vectors are L2-normalized; sparse weights span
/// `[-0.5, 1.0)` so some positions fall below the weight threshold.
pub struct DummyBackend {
    model: String,
    dense_dim: usize,
    sparse_dim: usize,
    colbert_dim: usize,
}

impl DummyBackend {
    pub fn new(dense_dim: usize, sparse_dim: usize, colbert_dim: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dense_dim,
            sparse_dim,
            colbert_dim,
        }
    }
}

impl InferenceBackend for DummyBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn infer(&self, input: &ModelInput) -> Result<ModelOutput> {
        let len = input.len();
        let id_bytes: Vec<u8> = input
            .input_ids
            .iter()
            .flat_map(|id| id.to_le_bytes())
            .collect();

        let mut dense_row = hashed_floats(&[b"dense".as_slice(), &id_bytes], self.dense_dim);
        dense_row.iter_mut().for_each(|v| *v = *v * 2.0 - 1.0);
        l2_normalize(&mut dense_row);
        let dense = Array2::from_shape_vec((1, self.dense_dim), dense_row)?;

        let mut sparse = Vec::with_capacity(len * self.sparse_dim);
        let mut colbert = Vec::with_capacity(len * self.colbert_dim);
        for (position, id) in input.input_ids.iter().enumerate() {
            let key = [id.to_le_bytes(), (position as i64).to_le_bytes()].concat();

            sparse.extend(
                hashed_floats(&[b"sparse".as_slice(), &key], self.sparse_dim)
                    .into_iter()
                    .map(|v| v * 1.5 - 0.5),
            );

            let mut vector = hashed_floats(&[b"colbert".as_slice(), &key], self.colbert_dim);
            vector.iter_mut().for_each(|v| *v = *v * 2.0 - 1.0);
            l2_normalize(&mut vector);
            colbert.extend(vector);
        }

        Ok(ModelOutput {
            dense,
            sparse_weights: Array3::from_shape_vec((1, len, self.sparse_dim), sparse)?,
            colbert: Array3::from_shape_vec((1, len, self.colbert_dim), colbert)?,
        })
    }
}

/// Runs `command` through `sh -c`, writing `payload` to stdin and parsing stdout as JSON.
fn run_json_command(command: &str, payload: &Value) -> Result<Value> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", command))?;

    let payload_str = payload.to_string();
    let stdin = child.stdin.take();

    // stdin is fed from its own thread so a child that answers before reading
    // all of its input cannot fill both pipes.
    let output = std::thread::scope(|scope| -> Result<Output> {
        let writer = scope.spawn(|| -> std::io::Result<()> {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(payload_str.as_bytes()) {
                // Commands that ignore stdin may exit before reading it.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        });

        let output = child
            .wait_with_output()
            .context("Failed to read command output")?;
        writer
            .join()
            .map_err(|_| anyhow!("stdin writer thread panicked"))?
            .context("Failed to write payload to stdin")?;
        Ok(output)
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Command '{}' failed (status {}): {}",
            command,
            output.status,
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .with_context(|| format!("Failed to parse output of '{}' as JSON", command))
}

fn as_object<'a>(value: &'a Value, who: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("{} command output must be a JSON object", who))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str], who: &str) -> Result<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .ok_or_else(|| anyhow::anyhow!("{} command output missing '{}' field", who, names[0]))
}

fn int_array(value: &Value, name: &str) -> Result<Vec<i64>> {
    value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("'{}' must be a JSON array", name))?
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| anyhow::anyhow!("'{}' values must be integers", name))
        })
        .collect()
}

/// `len` floats in `[0, 1)` derived from the blake3 XOF of `parts`.
fn hashed_floats(parts: &[&[u8]], len: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    let mut bytes = vec![0u8; len * 4];
    hasher.finalize_xof().fill(&mut bytes);
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            (raw >> 8) as f32 / (1u32 << 24) as f32
        })
        .collect()
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
