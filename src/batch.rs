//! Shuffled mini-batches.
//!
//! Both samplers shuffle an index permutation held in a temporary arena scope
//! and copy the chosen examples into dense matrices, one example per column,
//! so the kernels only ever see contiguous memory. The batch matrices are
//! allocated before the scope opens and outlive it.

use crate::arena::{Arena, Array};
use crate::data::Dataset;
use crate::rng::Lfsr113;
use crate::tensor::Matrix;

/// Inputs and targets of a mini-batch; column `j` is one example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batch {
    pub input: Matrix,
    pub output: Matrix,
}

impl Batch {
    fn raw(arena: &mut Arena, data: &Dataset, size: usize) -> Self {
        Self {
            input: Matrix::raw(arena, data.input_dim(), size),
            output: Matrix::raw(arena, data.target_dim(), size),
        }
    }

    /// Number of examples.
    #[inline]
    pub fn len(&self) -> usize {
        self.input.cols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill_column(&self, arena: &mut Arena, col: usize, data: &Dataset, example: usize) {
        arena
            .values_mut(self.input.column(col))
            .copy_from_slice(data.input(example));
        arena
            .values_mut(self.output.column(col))
            .copy_from_slice(data.target(example));
    }
}

fn identity_permutation(arena: &mut Arena, len: usize) -> Array<u32> {
    let indexes = arena.push_array::<u32>(len);
    for i in 0..len {
        arena.write(indexes, i, i as u32);
    }
    indexes
}

/// Draw `size` distinct examples uniformly at random.
///
/// Panics if `size > data.len()`.
pub fn sample_without_replacement(
    arena: &mut Arena,
    rng: &mut Lfsr113,
    data: &Dataset,
    size: usize,
) -> Batch {
    let count = data.len();
    assert!(size <= count, "sample of {size} from a dataset of {count}");

    let batch = Batch::raw(arena, data, size);
    arena.with_scope(|arena| {
        let indexes = identity_permutation(arena, count);
        for i in 0..size {
            let pick = rng.uniform_u32_in_range(i as u32, count as u32) as usize;
            let example = arena.read(indexes, pick);
            // Slot `i` is never drawn again, so only `pick` needs refilling.
            let displaced = arena.read(indexes, i);
            arena.write(indexes, pick, displaced);
            batch.fill_column(arena, i, data, example as usize);
        }
    });
    batch
}

/// Shuffle the whole dataset once and cut it into `data.len() / size`
/// batches of `size` examples.
///
/// Panics if `size` is zero or does not divide the dataset length.
pub fn create_batches(
    arena: &mut Arena,
    rng: &mut Lfsr113,
    data: &Dataset,
    size: usize,
) -> Vec<Batch> {
    let count = data.len();
    assert!(
        size > 0 && count.is_multiple_of(size),
        "batch size {size} does not divide dataset of {count}"
    );

    let batches: Vec<Batch> = (0..count / size)
        .map(|_| Batch::raw(arena, data, size))
        .collect();

    arena.with_scope(|arena| {
        let indexes = identity_permutation(arena, count);
        for i in 0..count {
            let pick = rng.uniform_u32_in_range(i as u32, count as u32) as usize;
            arena.swap(indexes, i, pick);
        }

        for i in 0..count {
            let example = arena.read(indexes, i) as usize;
            batches[i / size].fill_column(arena, i % size, data, example);
        }
    });
    batches
}
