//! Host-side example storage.
//!
//! A [`Dataset`] keeps every example contiguously: row `i` of the input
//! buffer is example `i`'s feature vector, row `i` of the target buffer its
//! expected output. Training never reads it directly; the batch sampler copies
//! the selected rows into arena matrices first.

use crate::{Error, Result};

/// A supervised dataset: inputs (X) and targets (Y).
///
/// Stored as contiguous buffers with row-major layout:
/// - `inputs.len() == len * input_dim`
/// - `targets.len() == len * target_dim`
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Vec<f32>,
    targets: Vec<f32>,
    input_dim: usize,
    target_dim: usize,
}

impl Dataset {
    /// Build a dataset from flat buffers.
    ///
    /// `inputs` is `(len, input_dim)` and `targets` is `(len, target_dim)`.
    pub fn from_flat(
        inputs: Vec<f32>,
        targets: Vec<f32>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if target_dim == 0 {
            return Err(Error::InvalidData("target_dim must be > 0".to_owned()));
        }
        if !inputs.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {input_dim}",
                inputs.len()
            )));
        }

        let len = inputs.len() / input_dim;
        if targets.len() != len * target_dim {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match len * target_dim ({len} * {target_dim})",
                targets.len()
            )));
        }

        Ok(Self {
            inputs,
            targets,
            input_dim,
            target_dim,
        })
    }

    /// Build a dataset from per-example rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.len()
            )));
        }
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }

        let input_dim = inputs[0].len();
        let target_dim = targets[0].len();
        let inputs = flatten("input", inputs, input_dim)?;
        let targets = flatten("target", targets, target_dim)?;
        Self::from_flat(inputs, targets, input_dim, target_dim)
    }

    #[inline]
    /// Returns the number of examples.
    pub fn len(&self) -> usize {
        self.inputs.len() / self.input_dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    #[inline]
    /// Returns the `idx`-th input row.
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    #[inline]
    /// Returns the `idx`-th target row.
    ///
    /// Panics if `idx >= len`.
    pub fn target(&self, idx: usize) -> &[f32] {
        let start = idx * self.target_dim;
        &self.targets[start..start + self.target_dim]
    }

    /// Keep only the first `len` examples.
    pub fn truncate(&mut self, len: usize) {
        self.inputs.truncate(len * self.input_dim);
        self.targets.truncate(len * self.target_dim);
    }

    /// Split into the first `at` examples and the rest.
    ///
    /// Panics if `at > len`.
    pub fn split_at(mut self, at: usize) -> (Dataset, Dataset) {
        assert!(at <= self.len(), "split point {at} beyond dataset of {}", self.len());
        let inputs = self.inputs.split_off(at * self.input_dim);
        let targets = self.targets.split_off(at * self.target_dim);
        let rest = Dataset {
            inputs,
            targets,
            input_dim: self.input_dim,
            target_dim: self.target_dim,
        };
        (self, rest)
    }
}

fn flatten(kind: &str, rows: &[Vec<f32>], dim: usize) -> Result<Vec<f32>> {
    if dim == 0 {
        return Err(Error::InvalidData(format!("{kind}_dim must be > 0")));
    }
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(Error::InvalidData(format!(
                "{kind} row {i} has len {}, expected {dim}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_from_flat_validates_shapes() {
        let ok = Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0], 2, 1);
        assert!(ok.is_ok());

        let err = Dataset::from_flat(vec![0.0, 1.0, 2.0], vec![0.0], 2, 1);
        assert!(err.is_err());

        let err = Dataset::from_flat(vec![0.0, 1.0], vec![0.0, 1.0], 2, 1);
        assert!(err.is_err());
    }

    #[test]
    fn dataset_from_rows_rejects_ragged_rows() {
        let xs = vec![vec![0.0, 1.0], vec![2.0]];
        let ys = vec![vec![1.0], vec![0.0]];
        assert!(matches!(
            Dataset::from_rows(&xs, &ys),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn rows_are_contiguous_per_example() {
        let xs = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let ys = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        let data = Dataset::from_rows(&xs, &ys).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.input(1), &[3.0, 4.0]);
        assert_eq!(data.target(1), &[0.0, 1.0]);
    }

    #[test]
    fn split_and_truncate_keep_example_order() {
        let xs: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32]).collect();
        let ys: Vec<Vec<f32>> = (0..5).map(|i| vec![-(i as f32)]).collect();
        let data = Dataset::from_rows(&xs, &ys).unwrap();

        let (train, held_out) = data.split_at(3);
        assert_eq!(train.len(), 3);
        assert_eq!(held_out.len(), 2);
        assert_eq!(held_out.input(0), &[3.0]);
        assert_eq!(held_out.target(1), &[-4.0]);

        let mut train = train;
        train.truncate(1);
        assert_eq!(train.len(), 1);
        assert_eq!(train.target(0), &[0.0]);
    }
}
