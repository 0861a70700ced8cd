// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model output tensors and conversion from nested JSON arrays.

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Array3};
use serde_json::Value;

/// Raw model output for a single-sequence call.
///
/// Expected shapes: dense `[1, D]`, sparse `[1, N, H]`, colbert `[1, N, E]`.
/// Shapes are validated by the post-processor, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub dense: Array2<f32>,
    pub sparse_weights: Array3<f32>,
    pub colbert: Array3<f32>,
}

/// Parses a rectangular `[[f32]]` array.
pub fn array2_from_json(value: &Value, name: &str) -> Result<Array2<f32>> {
    let rows = as_array(value, name)?;
    let parsed = rows
        .iter()
        .enumerate()
        .map(|(i, row)| float_row(row, &format!("{}[{}]", name, i)))
        .collect::<Result<Vec<_>>>()?;

    let cols = uniform_len(parsed.iter().map(Vec::len), name)?;
    let flat: Vec<f32> = parsed.into_iter().flatten().collect();
    Array2::from_shape_vec((rows.len(), cols), flat)
        .with_context(|| format!("Invalid shape for '{}'", name))
}

/// Parses a rectangular `[[[f32]]]` array.
pub fn array3_from_json(value: &Value, name: &str) -> Result<Array3<f32>> {
    let outer = as_array(value, name)?;
    let planes = outer
        .iter()
        .enumerate()
        .map(|(i, plane)| array2_from_json(plane, &format!("{}[{}]", name, i)))
        .collect::<Result<Vec<_>>>()?;

    let rows = uniform_len(planes.iter().map(|p| p.nrows()), name)?;
    // A plane with no rows carries no column information.
    let cols = uniform_len(
        planes.iter().filter(|p| p.nrows() > 0).map(|p| p.ncols()),
        name,
    )?;
    let flat: Vec<f32> = planes.iter().flat_map(|p| p.iter().copied()).collect();
    Array3::from_shape_vec((outer.len(), rows, cols), flat)
        .with_context(|| format!("Invalid shape for '{}'", name))
}

fn as_array<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("'{}' must be a JSON array", name))
}

fn float_row(value: &Value, name: &str) -> Result<Vec<f32>> {
    as_array(value, name)?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| anyhow::anyhow!("'{}' values must be numbers", name))
                .map(|v| v as f32)
        })
        .collect()
}

fn uniform_len(mut lens: impl Iterator<Item = usize>, name: &str) -> Result<usize> {
    let Some(first) = lens.next() else {
        return Ok(0);
    };
    if let Some(other) = lens.find(|&len| len != first) {
        bail!("'{}' is ragged: found rows of length {} and {}", name, first, other);
    }
    Ok(first)
}
