//! Loss functions.
//!
//! `forward` returns the loss averaged over the batch and caches the
//! (prediction, target) pair; `backward` consumes that pair and returns the
//! per-item gradient with respect to the prediction.

use std::fmt;

use nnlib_tensor::prelude::*;

use crate::error::{NnError, NnResult};

/// Tag identifying a loss function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossKind {
    Mse,
    SparseCategoricalCrossEntropy,
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::Mse => f.write_str("mse"),
            LossKind::SparseCategoricalCrossEntropy => f.write_str("sparse categorical cross-entropy"),
        }
    }
}

pub trait Loss: Send + fmt::Debug {
    fn kind(&self) -> LossKind;

    /// Batch-averaged loss of `prediction` against `target`.
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> NnResult<f64>;

    /// Gradient of the per-item loss with respect to the last prediction.
    fn backward(&mut self) -> NnResult<Tensor>;
}

/// Last (prediction, target) pair seen by a loss.
#[derive(Debug, Default)]
struct Cached {
    pair: Option<(Tensor, Tensor)>,
}

impl Cached {
    fn store(&mut self, prediction: &Tensor, target: &Tensor) -> NnResult<()> {
        if prediction.dims() != target.dims() {
            return Err(NnError::TargetMismatch {
                prediction: prediction.dims(),
                target: target.dims(),
            });
        }
        self.pair = Some((prediction.clone(), target.clone()));
        Ok(())
    }

    fn take(&mut self, component: &'static str) -> NnResult<(Tensor, Tensor)> {
        self.pair
            .take()
            .ok_or(NnError::BackwardBeforeForward { component })
    }
}

/// Mean squared error: sum of squared differences per item, averaged over
/// the batch.
#[derive(Debug, Default)]
pub struct MseLoss {
    cache: Cached,
}

impl MseLoss {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Loss for MseLoss {
    fn kind(&self) -> LossKind {
        LossKind::Mse
    }

    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> NnResult<f64> {
        self.cache.store(prediction, target)?;
        let total = prediction.zip_sum(target, ShapeCheck::Skip, |p, t| (p - t) * (p - t))?;
        Ok(total / prediction.batch_size() as f64)
    }

    fn backward(&mut self) -> NnResult<Tensor> {
        let (prediction, target) = self.cache.take("mse loss")?;
        Ok(prediction.zip_map(&target, ShapeCheck::Skip, |p, t| 2.0 * (p - t))?)
    }
}

/// Cross-entropy of a softmax output against a (one-hot) target.
///
/// `backward` returns `prediction - target`, the gradient with respect to the
/// softmax *input*. Pair it only with a terminal
/// [`crate::activations::Softmax`].
#[derive(Debug, Default)]
pub struct SparseCategoricalCrossEntropy {
    cache: Cached,
}

impl SparseCategoricalCrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Loss for SparseCategoricalCrossEntropy {
    fn kind(&self) -> LossKind {
        LossKind::SparseCategoricalCrossEntropy
    }

    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> NnResult<f64> {
        self.cache.store(prediction, target)?;
        // 0 * ln(0) contributes nothing
        let total = prediction.zip_sum(target, ShapeCheck::Skip, |p, t| {
            if t == 0.0 {
                0.0
            } else {
                t * p.ln()
            }
        })?;
        Ok(-total / prediction.batch_size() as f64)
    }

    fn backward(&mut self) -> NnResult<Tensor> {
        let (prediction, target) = self.cache.take("cross-entropy loss")?;
        Ok(prediction.zip_map(&target, ShapeCheck::Skip, |p, t| p - t)?)
    }
}
