//! Stochastic Gradient Descent optimizer.

use log::{debug, trace};
use nnlib_tensor::Tensor;

use super::Optimizer;
use crate::error::{NnError, NnResult};
use crate::layers::{Layer, LayerGradients};

/// Accumulators of one trainable layer.
#[derive(Debug, Clone)]
struct Slot {
    weights: Tensor,
    bias: Tensor,
    /// Velocity buffers, present once momentum has been applied.
    velocity: Option<(Tensor, Tensor)>,
}

/// SGD optimizer with optional momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    /// Learning rate.
    pub learning_rate: f64,
    /// Momentum coefficient.
    pub momentum: f64,
    slots: Vec<Option<Slot>>,
}

impl Sgd {
    /// Create a new SGD optimizer.
    pub fn new(learning_rate: f64) -> Self {
        Self::with_momentum(learning_rate, 0.0)
    }

    /// Create an SGD optimizer with momentum.
    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Self {
        Sgd {
            learning_rate,
            momentum,
            slots: Vec::new(),
        }
    }

    fn slot_mut(&mut self, index: usize) -> NnResult<&mut Option<Slot>> {
        self.slots.get_mut(index).ok_or(NnError::OptimizerSlot {
            index,
            reason: "no slot registered",
        })
    }

    /// One parameter update, returning the new parameter and velocity.
    fn step(
        &self,
        param: &Tensor,
        acc: &Tensor,
        velocity: Option<&Tensor>,
        batches: f64,
    ) -> NnResult<(Tensor, Option<Tensor>)> {
        if self.momentum > 0.0 {
            // v = momentum * v + acc / n; param = param - lr * v
            let grad = acc.scale(1.0 / batches);
            let v = match velocity {
                Some(v) => (&v.scale(self.momentum) + &grad)?,
                None => grad,
            };
            let updated = (param - &v.scale(self.learning_rate))?;
            Ok((updated, Some(v)))
        } else {
            // param = param - (lr / n) * acc
            let updated = (param - &acc.scale(self.learning_rate / batches))?;
            Ok((updated, None))
        }
    }
}

impl Optimizer for Sgd {
    fn reset(&mut self) {
        self.slots.clear();
    }

    fn register(&mut self, layer: &dyn Layer) -> NnResult<()> {
        let slot = layer.parameters().map(|(w, b)| Slot {
            weights: w.zero_out(),
            bias: b.zero_out(),
            velocity: None,
        });
        debug!(
            "sgd slot {} registered for {} layer (trainable: {})",
            self.slots.len(),
            layer.kind(),
            slot.is_some()
        );
        self.slots.push(slot);
        Ok(())
    }

    fn registered(&self) -> usize {
        self.slots.len()
    }

    fn accumulate(&mut self, index: usize, grads: &LayerGradients) -> NnResult<()> {
        let slot = self.slot_mut(index)?;
        match (slot, &grads.weights, &grads.bias) {
            (Some(slot), Some(dw), Some(db)) => {
                slot.weights = (&slot.weights + dw)?;
                slot.bias = (&slot.bias + db)?;
                Ok(())
            }
            (None, None, None) => Ok(()),
            _ => Err(NnError::OptimizerSlot {
                index,
                reason: "gradients do not match the registered layer",
            }),
        }
    }

    fn apply(&mut self, batches: usize, layers: &mut [Box<dyn Layer>]) -> NnResult<()> {
        if layers.len() != self.registered() {
            return Err(NnError::OptimizerSlot {
                index: layers.len().min(self.registered()),
                reason: "layer count differs from registered slots",
            });
        }
        if batches == 0 {
            return Err(NnError::NoAccumulatedGradients);
        }
        let n = batches as f64;

        for index in 0..layers.len() {
            let Some(slot) = &self.slots[index] else {
                continue;
            };
            let layer = &mut layers[index];
            let (w, b) = layer.parameters().ok_or(NnError::OptimizerSlot {
                index,
                reason: "layer has no parameters",
            })?;

            let (vw, vb) = match &slot.velocity {
                Some((vw, vb)) => (Some(vw), Some(vb)),
                None => (None, None),
            };
            let (new_w, vw) = self.step(w, &slot.weights, vw, n)?;
            let (new_b, vb) = self.step(b, &slot.bias, vb, n)?;
            layer.set_parameters(new_w, new_b)?;

            let velocity = vw.zip(vb);
            if let Some(slot) = &mut self.slots[index] {
                slot.weights = slot.weights.zero_out();
                slot.bias = slot.bias.zero_out();
                slot.velocity = velocity;
            }
        }
        trace!("sgd applied gradients averaged over {batches} backward passes");
        Ok(())
    }
}
