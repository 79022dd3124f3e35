//! # nnlib - Feed-Forward Neural Network Training
//!
//! Sequential networks on top of the [`nnlib_tensor`] batched tensor type:
//!
//! - **Layers**: Input, Dense (fully connected), Flatten
//! - **Activations**: Linear, ReLU, Softmax
//! - **Losses**: MSE, Sparse Categorical Cross-Entropy (after Softmax)
//! - **Optimizers**: SGD (with momentum), gradients averaged per mini-batch
//! - **Training**: [`Network`] with `fit`/`evaluate` over a [`Dataset`]
//!
//! ## Example: Training a Simple MLP
//!
//! ```
//! use nnlib::prelude::*;
//!
//! let mut net = Network::with_config(NetworkConfig::seeded(42));
//! net.add(Dense::with_input(2, 8)?.with_activation(ActivationKind::Relu))?
//!     .add(Dense::new(1)?)?;
//! net.compile(MseLoss::new(), Sgd::new(0.05))?;
//!
//! let x = Tensor::from_batches(1, 2, 1, &[vec![0.0, 1.0], vec![1.0, 1.0]])?;
//! let y = Tensor::from_batches(1, 1, 1, &[vec![1.0], vec![0.0]])?;
//!
//! for _ in 0..10 {
//!     net.forward(&x, &y)?;
//!     net.backward()?;
//!     net.update_weights()?;
//! }
//! let prediction = net.predict(&x)?;
//! assert_eq!(prediction.batch_size(), 2);
//! # Ok::<(), nnlib::NnError>(())
//! ```

pub mod activations;
pub mod dataset;
pub mod error;
pub mod finite_diff;
pub mod init;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod persist;
pub mod report;

// Re-exports for convenience
pub use activations::{Activation, ActivationKind};
pub use dataset::{Batch, Dataset, InMemoryDataset};
pub use error::{NnError, NnResult};
pub use init::{InitRng, Initializer};
pub use layers::{Dense, Flatten, Input, InputShape, Layer, LayerGradients, LayerKind};
pub use loss::{Loss, LossKind, MseLoss, SparseCategoricalCrossEntropy};
pub use network::{Network, NetworkConfig};
pub use optim::{Optimizer, Sgd};
pub use persist::{
    read_records, write_records, DefaultLayerFactory, LayerFactory, LayerRecord, ParameterRecord,
};
pub use report::{EpochReport, EvaluationReport, LogReporter, TrainingReporter};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ActivationKind, Dataset, Dense, Flatten, InMemoryDataset, Initializer, Input, Layer,
        MseLoss, Network, NetworkConfig, NnError, NnResult, Sgd, SparseCategoricalCrossEntropy,
    };
    pub use nnlib_tensor::prelude::*;
}
