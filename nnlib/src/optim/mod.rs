//! Optimizers for neural network training.
//!
//! An optimizer keeps one gradient accumulator slot per network layer, in
//! layer order. Slots of layers without parameters stay empty.

mod sgd;

pub use sgd::Sgd;

use std::fmt;

use crate::error::NnResult;
use crate::layers::{Layer, LayerGradients};

pub trait Optimizer: Send + fmt::Debug {
    /// Drop every registered slot.
    fn reset(&mut self);

    /// Append the slot for the next layer in network order.
    fn register(&mut self, layer: &dyn Layer) -> NnResult<()>;

    /// Number of registered slots.
    fn registered(&self) -> usize;

    /// Add one backward pass worth of gradients to the slot of layer `index`.
    fn accumulate(&mut self, index: usize, grads: &LayerGradients) -> NnResult<()>;

    /// Apply the accumulated gradients, averaged over `batches` backward
    /// passes, to every trainable layer, then zero the accumulators.
    fn apply(&mut self, batches: usize, layers: &mut [Box<dyn Layer>]) -> NnResult<()>;
}
