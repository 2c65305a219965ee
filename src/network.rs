//! Network topology, parameters and the forward pass.
//!
//! A [`Network`] with widths `[n0, n1, ..., nL]` has a weight matrix
//! `W[l]` of shape `(n[l], n[l-1])` and a bias vector `b[l]` of length `n[l]`
//! for every layer `l >= 1`. Layer 0 is the input and has no parameters, so
//! the accessors take the layer number directly.
//!
//! Parameters live in the arena region that was current when the network was
//! created (or loaded); keep that region alive for as long as the network is
//! used.

use crate::arena::{Arena, WORD_BYTES};
use crate::cost::CostFunction;
use crate::rng::Lfsr113;
use crate::tensor::{Matrix, Tensor, Vector};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    cost: CostFunction,
    layers: Vec<usize>,
    weights: Vec<Matrix>,
    biases: Vec<Vector>,
}

/// Per-layer values of one single-example forward pass.
///
/// Index 0 holds a copy of the input in both arrays.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    weighted_inputs: Vec<Vector>,
    activations: Vec<Vector>,
}

/// Per-layer values of one batched forward pass, one example per column.
///
/// Index 0 holds a copy of the input batch in both arrays.
#[derive(Debug, Clone)]
pub struct BatchTrace {
    weighted_inputs: Vec<Matrix>,
    activations: Vec<Matrix>,
}

impl ForwardTrace {
    /// `z[l]`
    #[inline]
    pub fn weighted_input(&self, layer: usize) -> Vector {
        self.weighted_inputs[layer]
    }

    /// `a[l] = σ(z[l])`
    #[inline]
    pub fn activation(&self, layer: usize) -> Vector {
        self.activations[layer]
    }

    /// Activation of the last layer.
    #[inline]
    pub fn output(&self) -> Vector {
        self.activations[self.activations.len() - 1]
    }
}

impl BatchTrace {
    #[inline]
    pub fn weighted_input(&self, layer: usize) -> Matrix {
        self.weighted_inputs[layer]
    }

    #[inline]
    pub fn activation(&self, layer: usize) -> Matrix {
        self.activations[layer]
    }

    #[inline]
    pub fn output(&self) -> Matrix {
        self.activations[self.activations.len() - 1]
    }

    /// Number of layers traced, including the input layer.
    #[inline]
    pub fn layer_count(&self) -> usize {
        self.activations.len()
    }
}

fn validate_widths(layers: &[usize]) -> Result<()> {
    if layers.len() < 2 {
        return Err(Error::InvalidConfig(
            "layers must include input and output widths".to_owned(),
        ));
    }
    if layers.contains(&0) {
        return Err(Error::InvalidConfig(
            "all layer widths must be > 0".to_owned(),
        ));
    }
    Ok(())
}

impl Network {
    /// Allocate and randomly initialize a network.
    ///
    /// For each layer in order, the weights are drawn from
    /// `N(0, 1/√fan_in)` and then the biases from `N(0, 1)`.
    pub fn new(
        arena: &mut Arena,
        rng: &mut Lfsr113,
        layers: &[usize],
        cost: CostFunction,
    ) -> Result<Self> {
        validate_widths(layers)?;
        let parameters = layers
            .windows(2)
            .try_fold(0_usize, |acc, w| {
                (w[0] + 1).checked_mul(w[1]).and_then(|p| acc.checked_add(p))
            })
            .ok_or_else(|| Error::InvalidConfig(format!("layer widths {layers:?} overflow")))?;
        arena.check_fits(parameters.saturating_mul(WORD_BYTES))?;

        let mut weights = Vec::with_capacity(layers.len() - 1);
        let mut biases = Vec::with_capacity(layers.len() - 1);
        for w in layers.windows(2) {
            let (fan_in, width) = (w[0], w[1]);
            let std_dev = 1.0 / (fan_in as f32).sqrt();
            weights.push(Matrix::random_gaussian(arena, rng, width, fan_in, 0.0, std_dev));
            biases.push(Vector::random_gaussian(arena, rng, width, 0.0, 1.0));
        }

        Ok(Self {
            cost,
            layers: layers.to_vec(),
            weights,
            biases,
        })
    }

    /// Assemble a network from existing parameter tensors.
    ///
    /// `weights[i]` and `biases[i]` belong to layer `i + 1`; their shapes must
    /// agree with consecutive widths.
    pub fn from_parts(cost: CostFunction, weights: Vec<Matrix>, biases: Vec<Vector>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidShape("network needs at least one layer of weights".to_owned()));
        }
        if weights.len() != biases.len() {
            return Err(Error::InvalidShape(format!(
                "{} weight matrices but {} bias vectors",
                weights.len(),
                biases.len()
            )));
        }

        let mut layers = Vec::with_capacity(weights.len() + 1);
        layers.push(weights[0].cols());
        for (i, (w, b)) in weights.iter().zip(&biases).enumerate() {
            let l = i + 1;
            if w.cols() != layers[i] {
                return Err(Error::InvalidShape(format!(
                    "weight[{l}] has {} cols, expected {}",
                    w.cols(),
                    layers[i]
                )));
            }
            if b.dim() != w.rows() {
                return Err(Error::InvalidShape(format!(
                    "bias[{l}] has dim {}, expected {}",
                    b.dim(),
                    w.rows()
                )));
            }
            layers.push(w.rows());
        }
        validate_widths(&layers).map_err(|err| Error::InvalidShape(err.to_string()))?;

        Ok(Self {
            cost,
            layers,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn cost(&self) -> CostFunction {
        self.cost
    }

    #[inline]
    pub fn set_cost(&mut self, cost: CostFunction) {
        self.cost = cost;
    }

    /// Layer widths, input first.
    #[inline]
    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0]
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1]
    }

    /// `W[layer]` for `1 <= layer < layer_count()`.
    #[inline]
    pub fn weight(&self, layer: usize) -> Matrix {
        assert!(
            (1..self.layers.len()).contains(&layer),
            "layer {layer} has no weights"
        );
        self.weights[layer - 1]
    }

    /// `b[layer]` for `1 <= layer < layer_count()`.
    #[inline]
    pub fn bias(&self, layer: usize) -> Vector {
        assert!(
            (1..self.layers.len()).contains(&layer),
            "layer {layer} has no bias"
        );
        self.biases[layer - 1]
    }

    /// Total number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>()
            + self.biases.iter().map(|b| b.dim()).sum::<usize>()
    }

    /// Single-example forward pass.
    pub fn feed_forward(&self, arena: &mut Arena, input: Vector) -> ForwardTrace {
        debug_assert_eq!(input.dim(), self.input_dim(), "input dim mismatch");

        let first = arena.copy(input);
        let mut weighted_inputs = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len());
        weighted_inputs.push(first);
        activations.push(first);

        for l in 1..self.layers.len() {
            let product = arena.mult_vec(self.weight(l), activations[l - 1]);
            let z = arena.add(product, self.bias(l));
            let a = arena.sigmoid(z);
            weighted_inputs.push(z);
            activations.push(a);
        }

        ForwardTrace {
            weighted_inputs,
            activations,
        }
    }

    /// Forward pass over a batch stored one example per column.
    pub fn feed_forward_batch(&self, arena: &mut Arena, inputs: Matrix) -> BatchTrace {
        debug_assert_eq!(inputs.rows(), self.input_dim(), "input dim mismatch");

        let first = arena.copy(inputs);
        let mut weighted_inputs = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len());
        weighted_inputs.push(first);
        activations.push(first);

        for l in 1..self.layers.len() {
            let product = arena.mult(self.weight(l), activations[l - 1]);
            let z = arena.add_columnwise(product, self.bias(l));
            let a = arena.sigmoid(z);
            weighted_inputs.push(z);
            activations.push(a);
        }

        BatchTrace {
            weighted_inputs,
            activations,
        }
    }
}
