//! Input layer: pins the network's expected input shape.

use log::debug;
use nnlib_tensor::{Shape, Tensor};

use super::{InputShape, Layer, LayerGradients, LayerKind, LayerState};
use crate::error::NnResult;
use crate::init::InitRng;

/// Identity layer with a fixed input shape.
#[derive(Debug, Clone)]
pub struct Input {
    state: LayerState,
}

impl Input {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Input {
            state: LayerState::new(InputShape::known(shape.into())),
        }
    }
}

impl Layer for Input {
    fn kind(&self) -> LayerKind {
        LayerKind::Input
    }

    fn input_shape(&self) -> InputShape {
        self.state.input
    }

    fn set_input_shape(&mut self, shape: InputShape) -> NnResult<()> {
        self.state.set_input(shape)
    }

    fn output_shape(&self) -> NnResult<Shape> {
        self.state.resolved_input()
    }

    fn is_compiled(&self) -> bool {
        self.state.compiled
    }

    fn compile(&mut self, _rng: &mut InitRng) -> NnResult<()> {
        if !self.state.compiled {
            let shape = self.state.resolved_input()?;
            debug!("input layer compiled: {shape}");
            self.state.compiled = true;
        }
        Ok(())
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.state.begin_forward("input layer", input)?;
        Ok(input.clone())
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<LayerGradients> {
        let output = self.output_shape()?;
        self.state.begin_backward("input layer", output, grad)?;
        Ok(LayerGradients::passthrough(grad.clone()))
    }
}
