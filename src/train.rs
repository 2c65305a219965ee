//! Training driver.
//!
//! These functions sit at the API boundary: they validate shapes and
//! hyperparameters and return [`Result`], then run the panicking arena
//! kernels underneath. Each call does its work inside a temporary scope, so
//! the arena mark is the same before and after.

use log::{debug, info};

use crate::arena::Arena;
use crate::batch::{create_batches, sample_without_replacement};
use crate::config::TrainConfig;
use crate::rng::Lfsr113;
use crate::tensor::Matrix;
use crate::{Dataset, Error, Network, Result};

/// Examples per forward pass in [`total_cost`].
const COST_CHUNK: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub regularization: f32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self::from(&TrainConfig::default())
    }
}

impl From<&TrainConfig> for FitConfig {
    fn from(config: &TrainConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            regularization: config.regularization,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Fraction of the test set classified correctly after this epoch.
    pub success_rate: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Success rate of the network before any training.
    pub initial_success_rate: f32,
    pub epochs: Vec<EpochReport>,
}

impl FitReport {
    /// Success rate after the last epoch (or before training if none ran).
    pub fn final_success_rate(&self) -> f32 {
        self.epochs
            .last()
            .map_or(self.initial_success_rate, |e| e.success_rate)
    }
}

fn check_dataset(network: &Network, data: &Dataset, what: &str) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidData(format!("{what} dataset must not be empty")));
    }
    if data.input_dim() != network.input_dim() {
        return Err(Error::InvalidData(format!(
            "{what} input_dim {} does not match network input_dim {}",
            data.input_dim(),
            network.input_dim()
        )));
    }
    if data.target_dim() != network.output_dim() {
        return Err(Error::InvalidData(format!(
            "{what} target_dim {} does not match network output_dim {}",
            data.target_dim(),
            network.output_dim()
        )));
    }
    Ok(())
}

fn check_hyperparameters(batch_size: usize, learning_rate: f32, regularization: f32) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
    }
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(Error::InvalidConfig(
            "learning_rate must be finite and > 0".to_owned(),
        ));
    }
    if !(regularization.is_finite() && regularization >= 0.0) {
        return Err(Error::InvalidConfig(
            "regularization must be finite and >= 0".to_owned(),
        ));
    }
    Ok(())
}

/// One pass over `data` in shuffled mini-batches of `batch_size`.
pub fn train_epoch(
    arena: &mut Arena,
    rng: &mut Lfsr113,
    network: &Network,
    data: &Dataset,
    batch_size: usize,
    learning_rate: f32,
    regularization: f32,
) -> Result<()> {
    check_dataset(network, data, "train")?;
    check_hyperparameters(batch_size, learning_rate, regularization)?;
    if !data.len().is_multiple_of(batch_size) {
        return Err(Error::InvalidConfig(format!(
            "batch_size {batch_size} does not divide train dataset of {}",
            data.len()
        )));
    }

    arena.with_scope(|arena| {
        let batches = create_batches(arena, rng, data, batch_size);
        debug!(
            "epoch: {} batches of {batch_size}, arena at {} of {} bytes",
            batches.len(),
            arena.size(),
            arena.capacity()
        );
        for batch in &batches {
            network.gradient_descent_batch(
                arena,
                batch.input,
                batch.output,
                learning_rate,
                regularization,
                data.len(),
            );
        }
    });
    Ok(())
}

/// Index of the first largest value.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Fraction of `data` whose most active output matches the target's.
pub fn evaluate(
    arena: &mut Arena,
    rng: &mut Lfsr113,
    network: &Network,
    data: &Dataset,
) -> Result<f32> {
    check_dataset(network, data, "test")?;

    let correct = arena.with_scope(|arena| {
        let batch = sample_without_replacement(arena, rng, data, data.len());
        let trace = network.feed_forward_batch(arena, batch.input);

        let guesses = arena.values(trace.output()).chunks_exact(network.output_dim());
        let answers = arena.values(batch.output).chunks_exact(network.output_dim());
        guesses
            .zip(answers)
            .filter(|(guess, answer)| argmax(guess) == argmax(answer))
            .count()
    });
    Ok(correct as f32 / data.len() as f32)
}

/// Mean cost over `data` plus the L2 penalty `λ/(2n)·Σw²`.
pub fn total_cost(
    arena: &mut Arena,
    network: &Network,
    data: &Dataset,
    regularization: f32,
) -> Result<f32> {
    check_dataset(network, data, "cost")?;
    let n = data.len();

    let mut cost = 0.0_f32;
    for start in (0..n).step_by(COST_CHUNK) {
        let count = COST_CHUNK.min(n - start);
        cost += arena.with_scope(|arena| {
            let inputs = Matrix::raw(arena, data.input_dim(), count);
            for col in 0..count {
                arena
                    .values_mut(inputs.column(col))
                    .copy_from_slice(data.input(start + col));
            }
            let trace = network.feed_forward_batch(arena, inputs);
            let outputs = arena.values(trace.output());
            outputs
                .chunks_exact(network.output_dim())
                .enumerate()
                .map(|(col, a)| network.cost().value(a, data.target(start + col)))
                .sum::<f32>()
        });
    }

    let squared_weights: f32 = (1..network.layer_count())
        .map(|l| arena.values(network.weight(l)).iter().map(|w| w * w).sum::<f32>())
        .sum();
    Ok(cost / n as f32 + regularization / (2.0 * n as f32) * squared_weights)
}

/// Train for `config.epochs` epochs, measuring `test` before training and
/// after every epoch.
pub fn fit(
    arena: &mut Arena,
    rng: &mut Lfsr113,
    network: &Network,
    train: &Dataset,
    test: &Dataset,
    config: FitConfig,
) -> Result<FitReport> {
    check_dataset(network, train, "train")?;
    check_dataset(network, test, "test")?;
    check_hyperparameters(config.batch_size, config.learning_rate, config.regularization)?;

    let initial_success_rate = evaluate(arena, rng, network, test)?;
    info!("success rate before training: {:.2}%", 100.0 * initial_success_rate);

    let mut epochs = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        train_epoch(
            arena,
            rng,
            network,
            train,
            config.batch_size,
            config.learning_rate,
            config.regularization,
        )?;
        let success_rate = evaluate(arena, rng, network, test)?;
        info!(
            "epoch {epoch}/{}: success rate {:.2}%",
            config.epochs,
            100.0 * success_rate
        );
        debug!("arena peak {} of {} bytes", arena.peak(), arena.capacity());
        epochs.push(EpochReport {
            epoch,
            success_rate,
        });
    }

    Ok(FitReport {
        initial_success_rate,
        epochs,
    })
}
