//! Activation functions.
//!
//! An activation is owned by the layer it follows and caches whatever its
//! backward pass needs from the latest forward pass. A backward call consumes
//! that cache, so each forward supports exactly one backward.

use std::fmt;
use std::str::FromStr;

use nnlib_tensor::prelude::*;

use crate::error::{NnError, NnResult};

/// Tag identifying an activation, used by layer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivationKind {
    #[default]
    Linear,
    Relu,
    Softmax,
}

impl ActivationKind {
    /// Fresh activation of this kind.
    pub fn build(self) -> Box<dyn Activation> {
        match self {
            ActivationKind::Linear => Box::new(Linear::default()),
            ActivationKind::Relu => Box::new(Relu::default()),
            ActivationKind::Softmax => Box::new(Softmax::default()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivationKind::Linear => "linear",
            ActivationKind::Relu => "relu",
            ActivationKind::Softmax => "softmax",
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationKind {
    type Err = NnError;

    fn from_str(name: &str) -> NnResult<Self> {
        match name {
            "linear" => Ok(ActivationKind::Linear),
            "relu" => Ok(ActivationKind::Relu),
            "softmax" => Ok(ActivationKind::Softmax),
            _ => Err(NnError::Format(format!("unknown activation {name:?}"))),
        }
    }
}

/// Elementwise (or per-item) transform applied after a layer's affine map.
pub trait Activation: Send + fmt::Debug {
    fn kind(&self) -> ActivationKind;

    /// Transform `input`, caching what the backward pass needs.
    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor>;

    /// Gradient with respect to the forward input, given the gradient of
    /// the forward output. Fails unless a forward pass came first.
    fn backward(&mut self, grad: &Tensor) -> NnResult<Tensor>;
}

/// Identity in both directions.
#[derive(Debug, Default)]
pub struct Linear {
    forward_performed: bool,
}

impl Activation for Linear {
    fn kind(&self) -> ActivationKind {
        ActivationKind::Linear
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.forward_performed = true;
        Ok(input.clone())
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<Tensor> {
        if !std::mem::take(&mut self.forward_performed) {
            return Err(NnError::BackwardBeforeForward { component: "linear" });
        }
        Ok(grad.clone())
    }
}

/// ReLU activation: max(0, x)
#[derive(Debug, Default)]
pub struct Relu {
    last_input: Option<Tensor>,
}

impl Activation for Relu {
    fn kind(&self) -> ActivationKind {
        ActivationKind::Relu
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        let output = input.map(|x| x.max(0.0));
        self.last_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<Tensor> {
        let input = self
            .last_input
            .take()
            .ok_or(NnError::BackwardBeforeForward { component: "relu" })?;
        Ok(grad.zip_map(&input, ShapeCheck::Enforce, |g, x| if x > 0.0 { g } else { 0.0 })?)
    }
}

/// Softmax over the rows of each batch item's column vector.
///
/// Only valid as the last activation of a network trained with
/// [`crate::loss::SparseCategoricalCrossEntropy`]: that loss returns the
/// gradient with respect to the softmax input, so `backward` passes the
/// gradient through unchanged.
#[derive(Debug, Default)]
pub struct Softmax {
    forward_performed: bool,
}

impl Activation for Softmax {
    fn kind(&self) -> ActivationKind {
        ActivationKind::Softmax
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        let dims = input.dims();
        if dims.depth != 1 || dims.columns != 1 {
            return Err(NnError::UnsupportedSoftmaxShape(dims));
        }

        let mut out = Vec::with_capacity(input.len());
        for item in input.as_slice().chunks(dims.rows) {
            // Subtract max for numerical stability
            let max = item.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let start = out.len();
            out.extend(item.iter().map(|&x| (x - max).exp()));
            let sum: f64 = out[start..].iter().sum();
            for v in &mut out[start..] {
                *v /= sum;
            }
        }

        self.forward_performed = true;
        Ok(Tensor::from_vec(dims, out)?)
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<Tensor> {
        if !std::mem::take(&mut self.forward_performed) {
            return Err(NnError::BackwardBeforeForward { component: "softmax" });
        }
        Ok(grad.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Tensor {
        Tensor::column(values).unwrap()
    }

    #[test]
    fn test_kind_names_parse_back() {
        for kind in [ActivationKind::Linear, ActivationKind::Relu, ActivationKind::Softmax] {
            assert_eq!(kind.name().parse::<ActivationKind>().unwrap(), kind);
        }
        assert!("tanh".parse::<ActivationKind>().is_err());
    }

    #[test]
    fn test_relu_forward() {
        let mut relu = Relu::default();
        let y = relu.forward(&column(&[-2.0, -1.0, 0.0, 1.0, 2.0])).unwrap();
        assert_eq!(y.as_slice(), &[0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_relu_backward_masks_gradient() {
        let mut relu = Relu::default();
        relu.forward(&column(&[-1.0, 0.0, 3.0, 0.5])).unwrap();
        let g = relu.backward(&column(&[10.0, 20.0, 30.0, 40.0])).unwrap();
        assert_eq!(g.as_slice(), &[0.0, 0.0, 30.0, 40.0]);
    }

    #[test]
    fn test_relu_uses_latest_forward() {
        let mut relu = Relu::default();
        relu.forward(&column(&[1.0, 1.0])).unwrap();
        relu.forward(&column(&[-1.0, 1.0])).unwrap();
        let g = relu.backward(&column(&[5.0, 5.0])).unwrap();
        assert_eq!(g.as_slice(), &[0.0, 5.0]);
    }

    #[test]
    fn test_backward_before_forward() {
        for kind in [ActivationKind::Linear, ActivationKind::Relu, ActivationKind::Softmax] {
            let mut act = kind.build();
            let err = act.backward(&column(&[1.0])).unwrap_err();
            assert!(matches!(err, NnError::BackwardBeforeForward { .. }));
        }
    }

    #[test]
    fn test_backward_consumes_forward() {
        let mut relu = Relu::default();
        relu.forward(&column(&[1.0])).unwrap();
        relu.backward(&column(&[1.0])).unwrap();
        assert!(relu.backward(&column(&[1.0])).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut softmax = Softmax::default();
        let x = Tensor::from_batches(1, 3, 1, &[vec![1.0, 2.0, 3.0], vec![1000.0, 1000.0, 1000.0]])
            .unwrap();
        let y = softmax.forward(&x).unwrap();

        let first = &y.as_slice()[0..3];
        let sum: f64 = first.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(first[2] > first[1] && first[1] > first[0]);

        // large logits stay finite
        for v in &y.as_slice()[3..] {
            assert!((v - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_softmax_rejects_non_column() {
        let mut softmax = Softmax::default();
        let x = Tensor::zeros(Dims::matrix(3, 2)).unwrap();
        assert!(matches!(
            softmax.forward(&x),
            Err(NnError::UnsupportedSoftmaxShape(_))
        ));
    }

    #[test]
    fn test_softmax_backward_passes_through() {
        let mut softmax = Softmax::default();
        softmax.forward(&column(&[0.1, 0.2])).unwrap();
        let g = column(&[0.3, -0.3]);
        assert_eq!(softmax.backward(&g).unwrap(), g);
    }
}
