//! Dense (fully connected) layer.

use log::debug;
use nnlib_tensor::{Dims, MultiplicationMode, Shape, Tensor};

use super::{InputShape, Layer, LayerGradients, LayerKind, LayerState};
use crate::activations::{Activation, ActivationKind};
use crate::error::{NnError, NnResult};
use crate::init::{InitRng, Initializer};

/// A dense layer: `y = activation(W * x + b)`.
///
/// `W` is a single `units x inputs` matrix in
/// [`MultiplicationMode::LastLevel`], so it broadcasts over the batch and, for
/// inputs deeper than one slice, reads only the last depth slice. `b` is a
/// `units x 1` column added to every column of `W * x`.
#[derive(Debug)]
pub struct Dense {
    state: LayerState,
    units: usize,
    activation: Box<dyn Activation>,
    weight_init: Initializer,
    bias_init: Initializer,
    weights: Option<Tensor>,
    bias: Option<Tensor>,
    last_input: Option<Tensor>,
}

impl Dense {
    /// Dense layer whose input size is inferred from the previous layer.
    pub fn new(units: usize) -> NnResult<Self> {
        if units == 0 {
            return Err(NnError::InvalidArgument(
                "dense layer needs at least one unit".to_string(),
            ));
        }
        Ok(Dense {
            state: LayerState::default(),
            units,
            activation: ActivationKind::Linear.build(),
            weight_init: Initializer::default(),
            bias_init: Initializer::Zeros,
            weights: None,
            bias: None,
            last_input: None,
        })
    }

    /// Dense layer over column vectors of `inputs` elements.
    pub fn with_input(inputs: usize, units: usize) -> NnResult<Self> {
        if inputs == 0 {
            return Err(NnError::InvalidArgument(
                "dense layer needs at least one input".to_string(),
            ));
        }
        let mut layer = Self::new(units)?;
        layer.state = LayerState::new(InputShape::known(Shape::column(inputs)));
        Ok(layer)
    }

    /// Dense layer over existing parameters.
    ///
    /// `weights` must be a single `units x inputs` matrix and `bias`, when
    /// given, a `units x 1` column; a missing bias starts at zero.
    pub fn from_parameters(weights: Tensor, bias: Option<Tensor>) -> NnResult<Self> {
        let w = weights.dims();
        if w.batch != 1 || w.depth != 1 {
            return Err(NnError::InvalidArgument(format!(
                "dense weights must be a single matrix, got {w}"
            )));
        }
        let bias = match bias {
            Some(b) if b.dims() == Dims::matrix(w.rows, 1) => b,
            Some(b) => {
                return Err(NnError::InvalidArgument(format!(
                    "bias {} does not match {} weight rows",
                    b.dims(),
                    w.rows
                )))
            }
            None => Tensor::zeros(Dims::matrix(w.rows, 1))?,
        };

        let mut layer = Self::new(w.rows)?;
        layer.state = LayerState::new(InputShape {
            rows: Some(w.columns),
            ..InputShape::unset()
        });
        layer.weights = Some(weights.with_mode(MultiplicationMode::LastLevel));
        layer.bias = Some(bias);
        Ok(layer)
    }

    pub fn with_activation(mut self, kind: ActivationKind) -> Self {
        self.activation = kind.build();
        self
    }

    pub fn with_weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = init;
        self
    }

    pub fn with_bias_init(mut self, init: Initializer) -> Self {
        self.bias_init = init;
        self
    }

    fn compiled_parameters(&self) -> NnResult<(&Tensor, &Tensor)> {
        match (&self.weights, &self.bias) {
            (Some(w), Some(b)) if self.state.compiled => Ok((w, b)),
            _ => Err(NnError::NotCompiled {
                component: "dense layer",
            }),
        }
    }
}

impl Layer for Dense {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn input_shape(&self) -> InputShape {
        self.state.input
    }

    fn set_input_shape(&mut self, shape: InputShape) -> NnResult<()> {
        self.state.set_input(shape)
    }

    fn output_shape(&self) -> NnResult<Shape> {
        let input = self.state.resolved_input()?;
        Ok(Shape::new(1, self.units, input.columns))
    }

    fn activation(&self) -> Option<ActivationKind> {
        Some(self.activation.kind())
    }

    fn is_compiled(&self) -> bool {
        self.state.compiled
    }

    fn compile(&mut self, rng: &mut InitRng) -> NnResult<()> {
        if self.state.compiled {
            return Ok(());
        }
        let input = self.state.resolved_input()?;
        let inputs = input.rows;

        let weights = match self.weights.take() {
            Some(w) if w.columns() == inputs => w,
            Some(w) => {
                let actual = w.item_shape();
                self.weights = Some(w);
                return Err(NnError::ShapeMismatch {
                    expected: format!("1x{}x{}", self.units, inputs),
                    actual,
                });
            }
            None => self
                .weight_init
                .tensor(Dims::matrix(self.units, inputs), inputs, self.units, rng)?
                .with_mode(MultiplicationMode::LastLevel),
        };
        let bias = match self.bias.take() {
            Some(b) => b,
            None => self
                .bias_init
                .tensor(Dims::matrix(self.units, 1), inputs, self.units, rng)?,
        };

        debug!(
            "dense layer compiled: {input} -> {}, {} activation",
            self.output_shape()?,
            self.activation.kind()
        );
        self.weights = Some(weights);
        self.bias = Some(bias);
        self.state.compiled = true;
        Ok(())
    }

    fn forward(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.state.begin_forward("dense layer", input)?;
        let (w, b) = self.compiled_parameters()?;
        let z = (&(w * input)? + b)?;
        let output = self.activation.forward(&z)?;
        self.last_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> NnResult<LayerGradients> {
        let output = self.output_shape()?;
        self.state.begin_backward("dense layer", output, grad)?;
        let input = self
            .last_input
            .take()
            .ok_or(NnError::BackwardBeforeForward {
                component: "dense layer",
            })?;

        let g = self.activation.backward(grad)?;
        let (w, _) = self.compiled_parameters()?;

        // Only the last depth slice took part in the forward product.
        let depth = input.depth();
        let x = if depth > 1 { input.last_level() } else { input };
        let inv_batch = 1.0 / g.batch_size() as f64;

        let weights = (&g * &x.transpose())?.sum_batch().scale(inv_batch);
        let bias = g.sum_rows().sum_batch().scale(inv_batch);

        let upstream = (&w.transpose() * &g)?;
        let upstream = if depth > 1 {
            upstream.expand_last_level(depth)?
        } else {
            upstream
        };

        Ok(LayerGradients {
            input: upstream,
            weights: Some(weights),
            bias: Some(bias),
        })
    }

    fn parameters(&self) -> Option<(&Tensor, &Tensor)> {
        self.compiled_parameters().ok()
    }

    fn set_parameters(&mut self, weights: Tensor, bias: Tensor) -> NnResult<()> {
        let (w, b) = self.compiled_parameters()?;
        if weights.dims() != w.dims() || bias.dims() != b.dims() {
            return Err(NnError::ShapeMismatch {
                expected: format!("{} and {}", w.item_shape(), b.item_shape()),
                actual: weights.item_shape(),
            });
        }
        self.weights = Some(weights.with_mode(MultiplicationMode::LastLevel));
        self.bias = Some(bias);
        Ok(())
    }
}
