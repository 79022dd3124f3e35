//! Network layers.
//!
//! Every layer moves through two states: uncompiled, while its input shape
//! may still be inferred or changed, and compiled, once parameters exist and
//! the shape is locked. Forward and backward passes require a compiled
//! layer, and each backward pass must follow a forward pass.

mod dense;
mod flatten;
mod input;

pub use dense::Dense;
pub use flatten::Flatten;
pub use input::Input;

use std::fmt;
use std::str::FromStr;

use nnlib_tensor::{Shape, Tensor};

use crate::activations::ActivationKind;
use crate::error::{NnError, NnResult};
use crate::init::InitRng;

/// Tag identifying a layer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Input,
    Dense,
    Flatten,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Input => f.write_str("input"),
            LayerKind::Dense => f.write_str("dense"),
            LayerKind::Flatten => f.write_str("flatten"),
        }
    }
}

impl FromStr for LayerKind {
    type Err = NnError;

    /// Inverse of `Display`: `input`, `dense` or `flatten`.
    fn from_str(tag: &str) -> NnResult<Self> {
        match tag {
            "input" => Ok(LayerKind::Input),
            "dense" => Ok(LayerKind::Dense),
            "flatten" => Ok(LayerKind::Flatten),
            _ => Err(NnError::Format(format!("unknown layer type {tag:?}"))),
        }
    }
}

/// Declared input shape of a layer; `None` components are inferred from the
/// preceding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputShape {
    pub depth: Option<usize>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
}

impl InputShape {
    pub const fn unset() -> Self {
        InputShape {
            depth: None,
            rows: None,
            columns: None,
        }
    }

    pub const fn known(shape: Shape) -> Self {
        InputShape {
            depth: Some(shape.depth),
            rows: Some(shape.rows),
            columns: Some(shape.columns),
        }
    }

    /// The full shape, if every component is known.
    pub fn resolved(&self) -> Option<Shape> {
        Some(Shape::new(self.depth?, self.rows?, self.columns?))
    }

    /// Whether every known component equals the matching component of `shape`.
    pub fn accepts(&self, shape: Shape) -> bool {
        let fits = |declared: Option<usize>, actual: usize| declared.map_or(true, |d| d == actual);
        fits(self.depth, shape.depth) && fits(self.rows, shape.rows) && fits(self.columns, shape.columns)
    }
}

impl From<Shape> for InputShape {
    fn from(shape: Shape) -> Self {
        InputShape::known(shape)
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<usize>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
        write!(f, "{}x{}x{}", part(self.depth), part(self.rows), part(self.columns))
    }
}

/// Result of a layer's backward pass.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    /// Gradient with respect to the layer input, passed to the previous layer.
    pub input: Tensor,
    /// Batch-averaged weight gradient; `None` for layers without parameters.
    pub weights: Option<Tensor>,
    /// Batch-averaged bias gradient; `None` for layers without parameters.
    pub bias: Option<Tensor>,
}

impl LayerGradients {
    pub fn passthrough(input: Tensor) -> Self {
        LayerGradients {
            input,
            weights: None,
            bias: None,
        }
    }
}

/// A stage of a sequential network.
pub trait Layer: Send + fmt::Debug {
    fn kind(&self) -> LayerKind;

    fn input_shape(&self) -> InputShape;

    /// Replace the declared input shape. Fails once compiled.
    fn set_input_shape(&mut self, shape: InputShape) -> NnResult<()>;

    /// Per-item output shape; needs a resolved input shape.
    fn output_shape(&self) -> NnResult<Shape>;

    /// Activation applied by this layer, if any.
    fn activation(&self) -> Option<ActivationKind> {
        None
    }

    fn is_compiled(&self) -> bool;

    /// Allocate parameters and lock the input shape. A second call is a
    /// no-op and keeps existing parameters.
    fn compile(&mut self, rng: &mut InitRng) -> NnResult<()>;

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor>;

    fn backward(&mut self, grad: &Tensor) -> NnResult<LayerGradients>;

    /// `(weights, bias)` of a trainable, compiled layer.
    fn parameters(&self) -> Option<(&Tensor, &Tensor)> {
        None
    }

    /// Replace the parameters of a trainable layer with same-shaped tensors.
    fn set_parameters(&mut self, _weights: Tensor, _bias: Tensor) -> NnResult<()> {
        Err(NnError::InvalidArgument(format!(
            "{} layer has no trainable parameters",
            self.kind()
        )))
    }
}

/// Shape and ordering bookkeeping shared by the concrete layers.
#[derive(Debug, Clone, Default)]
pub(crate) struct LayerState {
    pub(crate) input: InputShape,
    pub(crate) compiled: bool,
    forward_performed: bool,
}

impl LayerState {
    pub(crate) fn new(input: InputShape) -> Self {
        LayerState {
            input,
            ..Default::default()
        }
    }

    pub(crate) fn set_input(&mut self, shape: InputShape) -> NnResult<()> {
        if self.compiled {
            return Err(NnError::ShapeLocked);
        }
        self.input = shape;
        Ok(())
    }

    pub(crate) fn resolved_input(&self) -> NnResult<Shape> {
        self.input.resolved().ok_or(NnError::MissingInputShape)
    }

    /// Entry check of a forward pass: compiled, and `input` has the declared shape.
    pub(crate) fn begin_forward(&mut self, component: &'static str, input: &Tensor) -> NnResult<()> {
        if !self.compiled {
            return Err(NnError::NotCompiled { component });
        }
        check_shape(self.resolved_input()?, input)?;
        self.forward_performed = true;
        Ok(())
    }

    /// Entry check of a backward pass: a forward pass came first, and `grad`
    /// has the output shape.
    pub(crate) fn begin_backward(
        &mut self,
        component: &'static str,
        output: Shape,
        grad: &Tensor,
    ) -> NnResult<()> {
        if !self.compiled {
            return Err(NnError::NotCompiled { component });
        }
        if !std::mem::take(&mut self.forward_performed) {
            return Err(NnError::BackwardBeforeForward { component });
        }
        check_shape(output, grad)
    }
}

fn check_shape(expected: Shape, tensor: &Tensor) -> NnResult<()> {
    if tensor.item_shape() != expected {
        return Err(NnError::ShapeMismatch {
            expected: expected.to_string(),
            actual: tensor.item_shape(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_accepts() {
        let declared = InputShape {
            depth: None,
            rows: Some(10),
            columns: None,
        };
        assert!(declared.accepts(Shape::new(3, 10, 2)));
        assert!(!declared.accepts(Shape::new(1, 9, 1)));
        assert!(InputShape::unset().accepts(Shape::column(4)));
        assert_eq!(declared.resolved(), None);
        assert_eq!(declared.to_string(), "?x10x?");
    }

    #[test]
    fn test_layer_kind_tags() {
        for kind in [LayerKind::Input, LayerKind::Dense, LayerKind::Flatten] {
            assert_eq!(kind.to_string().parse::<LayerKind>().unwrap(), kind);
        }
        assert!(matches!("conv".parse::<LayerKind>(), Err(NnError::Format(_))));
        assert!("Dense".parse::<LayerKind>().is_err());
    }

    #[test]
    fn test_state_machine() {
        let mut state = LayerState::new(InputShape::known(Shape::column(2)));
        let x = Tensor::column(&[1.0, 2.0]).unwrap();

        assert!(matches!(
            state.begin_forward("test", &x),
            Err(NnError::NotCompiled { .. })
        ));

        state.compiled = true;
        assert!(matches!(
            state.set_input(InputShape::unset()),
            Err(NnError::ShapeLocked)
        ));
        assert!(matches!(
            state.begin_backward("test", Shape::column(2), &x),
            Err(NnError::BackwardBeforeForward { .. })
        ));

        state.begin_forward("test", &x).unwrap();
        state.begin_backward("test", Shape::column(2), &x).unwrap();
        assert!(state.begin_backward("test", Shape::column(2), &x).is_err());
    }

    #[test]
    fn test_forward_shape_check() {
        let mut state = LayerState::new(InputShape::known(Shape::column(3)));
        state.compiled = true;
        let x = Tensor::column(&[1.0, 2.0]).unwrap();
        let err = state.begin_forward("test", &x).unwrap_err();
        assert!(matches!(err, NnError::ShapeMismatch { .. }));
    }
}
