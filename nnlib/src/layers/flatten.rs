//! Flatten layer: (depth, rows, columns) items become column vectors.

use log::debug;
use nnlib_tensor::{Shape, Tensor};

use super::{InputShape, Layer, LayerGradients, LayerKind, LayerState};
use crate::error::NnResult;
use crate::init::InitRng;

#[derive(Debug, Clone, Default)]
pub struct Flatten {
    state: LayerState,
}

impl Flatten {
    /// Flatten layer whose input shape is inferred from the previous layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten layer with a fixed input shape, usable as the first layer.
    pub fn with_input(shape: impl Into<Shape>) -> Self {
        Flatten {
            state: LayerState::new(InputShape::known(shape.into())),
        }
    }
}

impl Layer for Flatten {
    fn kind(&self) -> LayerKind {
        LayerKind::Flatten
    }

    fn input_shape(&self) -> InputShape {
        self.state.input
    }

    fn set_input_shape(&mut self, shape: InputShape) -> NnResult<()> {
        self.state.set_input(shape)
    }

    fn output_shape(&self) -> NnResult<Shape> {
        Ok(Shape::column(self.state.resolved_input()?.numel()))
    }

    fn is_compiled(&self) -> bool {
        self.state.compiled
    }

    fn compile(&mut self, _rng: &mut InitRng) -> NnResult<()> {
        if !self.state.compiled {
            let (input, output) = (self.state.resolved_input()?, self.output_shape()?);
            debug!("flatten layer compiled: {input} -> {output}");
            self.state.compiled = true;
        }
        Ok(())
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.state.begin_forward("flatten layer", input)?;
        let output = self.output_shape()?;
        Ok(input.reshape(output.with_batch(input.batch_size()))?)
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<LayerGradients> {
        let output = self.output_shape()?;
        self.state.begin_backward("flatten layer", output, grad)?;
        let input = self.state.resolved_input()?;
        let reshaped = grad.reshape(input.with_batch(grad.batch_size()))?;
        Ok(LayerGradients::passthrough(reshaped))
    }
}
