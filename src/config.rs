//! Run configuration.
//!
//! Every field has a default, so a JSON config file only needs the keys it
//! changes. Unknown keys are rejected. Command-line flags are applied on top
//! of the file by the binary.
//!
//! ```json
//! {
//!   "hidden_layer": 30,
//!   "epochs": 10,
//!   "batch_size": 10,
//!   "learning_rate": 0.5,
//!   "regularization": 5.0,
//!   "save_network": "mnist.nn"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cost::CostFunction;
use crate::rng::DEFAULT_SEED;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Width of the single hidden layer of a freshly created network.
    pub hidden_layer: usize,
    pub epochs: usize,
    pub batch_size: usize,
    /// η
    pub learning_rate: f32,
    /// λ, the L2 weight-decay strength.
    pub regularization: f32,
    pub cost: CostFunction,
    /// Start from this network file instead of a random network.
    pub load_network: Option<PathBuf>,
    /// Write the trained network here when training finishes.
    pub save_network: Option<PathBuf>,
    /// Directory holding the four MNIST IDX files.
    pub data_dir: PathBuf,
    /// Number of leading training-file examples to train on; the rest are
    /// held out.
    pub training_size: usize,
    pub seed: u32,
    pub arena_megabytes: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden_layer: 100,
            epochs: 0,
            batch_size: 10,
            learning_rate: 1.0,
            regularization: 5.0,
            cost: CostFunction::CrossEntropy,
            load_network: None,
            save_network: None,
            data_dir: PathBuf::from("."),
            training_size: 50_000,
            seed: DEFAULT_SEED,
            arena_megabytes: 1024,
        }
    }
}

impl TrainConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| Error::InvalidConfig(format!("config json: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::Io(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_layer == 0 {
            return Err(Error::InvalidConfig("hidden_layer must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(
                "learning_rate must be finite and > 0".to_owned(),
            ));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(Error::InvalidConfig(
                "regularization must be finite and >= 0".to_owned(),
            ));
        }
        if self.training_size == 0 {
            return Err(Error::InvalidConfig("training_size must be > 0".to_owned()));
        }
        if self.epochs > 0 && !self.training_size.is_multiple_of(self.batch_size) {
            return Err(Error::InvalidConfig(format!(
                "batch_size {} does not divide training_size {}",
                self.batch_size, self.training_size
            )));
        }
        if self.arena_megabytes == 0 {
            return Err(Error::InvalidConfig("arena_megabytes must be > 0".to_owned()));
        }
        Ok(())
    }
}
