//! An arena-backed sigmoid MLP trainer.
//!
//! `arena-mlp` trains a fully connected feed-forward network with logistic
//! sigmoid activations using mini-batch gradient descent with L2
//! regularization. Every tensor lives in a single preallocated [`Arena`]:
//! the network occupies the base of the arena, and each epoch and each
//! gradient step allocate their temporaries inside nested scopes that are
//! released wholesale when the step ends.
//!
//! # Design goals
//!
//! - Constant memory: the arena never grows, and a training step leaves the
//!   arena mark exactly where it found it.
//! - Reproducibility: all randomness comes from an explicit [`Lfsr113`]
//!   generator, so a seed fixes initialization and shuffling.
//! - Exact math: backprop uses transposed products computed by stride
//!   selection, never by materializing a transpose.
//!
//! # Panics vs `Result`
//!
//! - Arena and tensor kernels (panic on misuse):
//!   - [`Arena::push_size`] panics when capacity is exhausted.
//!   - [`Arena::end_scope`] panics when scopes close out of order.
//!   - Tensor shape mismatches are `debug_assert!`s.
//!
//! - Boundary APIs (validated, return [`Result`]):
//!   - [`Network::new`], [`Network::from_parts`]
//!   - [`format::load_network`], [`mnist::read_dataset`], [`TrainConfig`]
//!   - [`train::train_epoch`], [`train::evaluate`], [`train::fit`]
//!   - Parameters that would not fit in the arena are reported as
//!     [`Error::Arena`] before anything is allocated.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - Matrices are column-major; weight `W[l]` has shape `(n[l], n[l-1])`.
//! - Batches hold one example per column.
//! - [`Dataset`] stores examples contiguously, one row per example.
//!
//! # Quick start
//!
//! ```rust
//! use arena_mlp::{Arena, CostFunction, Dataset, FitConfig, Lfsr113, Network, train};
//!
//! # fn main() -> arena_mlp::Result<()> {
//! let xs = vec![
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ];
//! let ys = vec![
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//! ];
//! let data = Dataset::from_rows(&xs, &ys)?;
//!
//! let mut arena = Arena::with_megabytes(1);
//! let mut rng = Lfsr113::default();
//! let network = Network::new(&mut arena, &mut rng, &[2, 8, 2], CostFunction::CrossEntropy)?;
//!
//! let report = train::fit(
//!     &mut arena,
//!     &mut rng,
//!     &network,
//!     &data,
//!     &data,
//!     FitConfig {
//!         epochs: 10,
//!         batch_size: 2,
//!         learning_rate: 1.0,
//!         regularization: 0.0,
//!     },
//! )?;
//! assert_eq!(report.epochs.len(), 10);
//! arena.check_empty();
//! # Ok(())
//! # }
//! ```
//!
//! # Driving steps by hand
//!
//! ```rust
//! use arena_mlp::{Arena, CostFunction, Lfsr113, Matrix, Network};
//!
//! # fn main() -> arena_mlp::Result<()> {
//! let mut arena = Arena::with_megabytes(1);
//! let mut rng = Lfsr113::new(7);
//! let network = Network::new(&mut arena, &mut rng, &[3, 4, 2], CostFunction::Quadratic)?;
//!
//! // Two examples, one per column.
//! let inputs = Matrix::from_slice(&mut arena, 3, 2, &[0.1, -0.2, 0.3, 0.5, 0.0, -0.5]);
//! let targets = Matrix::from_slice(&mut arena, 2, 2, &[0.0, 1.0, 1.0, 0.0]);
//!
//! let mark = arena.size();
//! network.gradient_descent_batch(&mut arena, inputs, targets, 0.5, 0.0, 2);
//! assert_eq!(arena.size(), mark);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod arena;
pub mod backprop;
pub mod batch;
pub mod config;
pub mod cost;
pub mod data;
pub mod error;
pub mod format;
pub(crate) mod matmul;
pub mod mnist;
pub mod network;
pub mod rng;
pub mod tensor;
pub mod train;

pub use arena::{Arena, ArenaError, Array, TempScope};
pub use backprop::{BackpropTrace, Gradients};
pub use batch::Batch;
pub use config::TrainConfig;
pub use cost::CostFunction;
pub use data::Dataset;
pub use error::{Error, Result};
pub use network::{BatchTrace, ForwardTrace, Network};
pub use rng::Lfsr113;
pub use tensor::{Matrix, Tensor, Vector};
pub use train::{EpochReport, FitConfig, FitReport};
