//! Batched backpropagation and the gradient-descent step.
//!
//! For a batch stored one example per column, the error signal of the last
//! layer comes from the cost function and every hidden layer `l` receives
//! `δ[l] = (W[l+1]ᵗ · δ[l+1]) ∘ σ'(z[l])`. Parameter gradients are summed over
//! the batch: `∇W[l] = δ[l] · a[l-1]ᵗ` and `∇b[l] = Σ_columns δ[l]`.

use crate::arena::Arena;
use crate::network::{BatchTrace, Network};
use crate::tensor::{Matrix, Vector};

/// A batched forward trace plus the error signal of every layer `l >= 1`.
#[derive(Debug, Clone)]
pub struct BackpropTrace {
    forward: BatchTrace,
    errors: Vec<Matrix>,
}

impl BackpropTrace {
    #[inline]
    pub fn forward(&self) -> &BatchTrace {
        &self.forward
    }

    /// `δ[layer]`, one column per example.
    #[inline]
    pub fn error(&self, layer: usize) -> Matrix {
        assert!(layer >= 1, "the input layer has no error signal");
        self.errors[layer - 1]
    }
}

/// Batch-summed parameter gradients for layers `l >= 1`.
#[derive(Debug, Clone)]
pub struct Gradients {
    weights: Vec<Matrix>,
    biases: Vec<Vector>,
}

impl Gradients {
    #[inline]
    pub fn weight(&self, layer: usize) -> Matrix {
        assert!(layer >= 1, "the input layer has no weights");
        self.weights[layer - 1]
    }

    #[inline]
    pub fn bias(&self, layer: usize) -> Vector {
        assert!(layer >= 1, "the input layer has no bias");
        self.biases[layer - 1]
    }
}

impl Network {
    /// Forward pass plus per-layer error signals for a batch.
    pub fn back_propagate_batch(
        &self,
        arena: &mut Arena,
        inputs: Matrix,
        targets: Matrix,
    ) -> BackpropTrace {
        debug_assert_eq!(targets.rows(), self.output_dim(), "target dim mismatch");
        debug_assert_eq!(targets.cols(), inputs.cols(), "batch width mismatch");

        let forward = self.feed_forward_batch(arena, inputs);
        let last = self.layer_count() - 1;

        let mut delta = self.cost().output_error(
            arena,
            forward.activation(last),
            targets,
            forward.weighted_input(last),
        );
        let mut errors = Vec::with_capacity(last);
        errors.push(delta);

        for l in (1..last).rev() {
            let propagated = arena.transpose_mult(self.weight(l + 1), delta);
            let slope = arena.sigmoid_prime(forward.weighted_input(l));
            delta = arena.hadamard(propagated, slope);
            errors.push(delta);
        }
        errors.reverse();

        BackpropTrace { forward, errors }
    }

    /// Gradients of the summed batch cost (not divided by the batch size).
    pub fn gradients(&self, arena: &mut Arena, inputs: Matrix, targets: Matrix) -> Gradients {
        let trace = self.back_propagate_batch(arena, inputs, targets);

        let mut weights = Vec::with_capacity(self.layer_count() - 1);
        let mut biases = Vec::with_capacity(self.layer_count() - 1);
        for l in 1..self.layer_count() {
            let delta = trace.error(l);
            weights.push(arena.mult_transpose(delta, trace.forward().activation(l - 1)));
            biases.push(arena.sum_columns(delta));
        }

        Gradients { weights, biases }
    }

    /// One regularized gradient-descent step on a batch.
    ///
    /// `W ← (1 − ηλ/M)·W − (η/N)·∇W` and `b ← b − (η/N)·∇b`, where `N` is the
    /// batch width and `M` the size of the whole training set. Parameters are
    /// updated in place in the arena; every temporary is reclaimed before
    /// returning.
    pub fn gradient_descent_batch(
        &self,
        arena: &mut Arena,
        inputs: Matrix,
        targets: Matrix,
        learning_rate: f32,
        regularization: f32,
        training_size: usize,
    ) {
        arena.with_scope(|arena| {
            let step = -learning_rate / inputs.cols() as f32;
            let decay = 1.0 - learning_rate * regularization / training_size as f32;
            let grads = self.gradients(arena, inputs, targets);

            for l in 1..self.layer_count() {
                let (w, dw) = (self.weight(l), grads.weight(l));
                arena.scale_equals(dw, step);
                arena.scale_equals(w, decay);
                arena.add_equals(w, dw);

                let (b, db) = (self.bias(l), grads.bias(l));
                arena.scale_equals(db, step);
                arena.add_equals(b, db);
            }
        });
    }
}
