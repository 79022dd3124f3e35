//! Layer snapshots for saving and restoring trained networks.
//!
//! A network exports one [`LayerRecord`] per layer. Parameter buffers are
//! stored as text in the form `{LENGTH:n}v0;v1;...;v(n-1)`, with every value
//! written in shortest round-trip decimal notation independent of locale.
//!
//! A record's text form is one line of whitespace-separated fields:
//!
//! ```text
//! dense 1x4x1 1x3x1 relu {LENGTH:12}0.1;... {LENGTH:3}0;0;0
//! flatten 1x2x2 1x4x1 - - -
//! ```
//!
//! [`write_records`] and [`read_records`] convert a whole network.

use std::fmt;
use std::str::FromStr;

use nnlib_tensor::{Dims, Shape, Tensor};

use crate::activations::ActivationKind;
use crate::error::{NnError, NnResult};
use crate::layers::{Dense, Flatten, Input, InputShape, Layer, LayerKind};

const LENGTH_PREFIX: &str = "{LENGTH:";

/// Encoded weight and bias buffers of a trainable layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
    pub weights: String,
    pub bias: String,
}

/// Snapshot of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub kind: LayerKind,
    pub input: Shape,
    pub output: Shape,
    pub activation: Option<ActivationKind>,
    pub parameters: Option<ParameterRecord>,
}

impl LayerRecord {
    /// Snapshot of a layer whose input shape is resolved.
    pub fn of(layer: &dyn Layer) -> NnResult<Self> {
        let input = layer
            .input_shape()
            .resolved()
            .ok_or(NnError::MissingInputShape)?;
        Ok(LayerRecord {
            kind: layer.kind(),
            input,
            output: layer.output_shape()?,
            activation: layer.activation(),
            parameters: layer.parameters().map(|(w, b)| ParameterRecord {
                weights: encode_parameters(w.as_slice()),
                bias: encode_parameters(b.as_slice()),
            }),
        })
    }
}

const ABSENT: &str = "-";

impl fmt::Display for LayerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.input, self.output)?;
        match self.activation {
            Some(kind) => write!(f, " {kind}")?,
            None => write!(f, " {ABSENT}")?,
        }
        match &self.parameters {
            Some(p) => write!(f, " {} {}", p.weights, p.bias),
            None => write!(f, " {ABSENT} {ABSENT}"),
        }
    }
}

impl FromStr for LayerRecord {
    type Err = NnError;

    fn from_str(line: &str) -> NnResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [kind, input, output, activation, weights, bias] = fields[..] else {
            return Err(NnError::Format(format!(
                "layer record needs 6 fields, found {}",
                fields.len()
            )));
        };

        let activation = match activation {
            ABSENT => None,
            name => Some(name.parse()?),
        };
        let parameters = match (weights, bias) {
            (ABSENT, ABSENT) => None,
            (ABSENT, _) | (_, ABSENT) => {
                return Err(NnError::Format(
                    "weights and bias must both be present or both absent".to_string(),
                ))
            }
            (w, b) => Some(ParameterRecord {
                weights: w.to_string(),
                bias: b.to_string(),
            }),
        };
        Ok(LayerRecord {
            kind: kind.parse()?,
            input: parse_shape(input)?,
            output: parse_shape(output)?,
            activation,
            parameters,
        })
    }
}

/// Parse the `DEPTHxROWSxCOLUMNS` form printed by [`Shape`]'s `Display`.
pub fn parse_shape(text: &str) -> NnResult<Shape> {
    let malformed = || NnError::Format(format!("malformed shape {text:?}"));
    let parts = text
        .split('x')
        .map(|part| match part.parse::<usize>() {
            Ok(n) if n > 0 && part.bytes().all(|b| b.is_ascii_digit()) => Ok(n),
            _ => Err(malformed()),
        })
        .collect::<NnResult<Vec<usize>>>()?;
    match parts[..] {
        [depth, rows, columns] => Ok(Shape::new(depth, rows, columns)),
        _ => Err(malformed()),
    }
}

/// One line per record.
pub fn write_records(records: &[LayerRecord]) -> String {
    records.iter().map(|r| format!("{r}\n")).collect()
}

/// Inverse of [`write_records`]; blank lines are skipped.
pub fn read_records(text: &str) -> NnResult<Vec<LayerRecord>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// `{LENGTH:n}v0;v1;...;v(n-1)`
pub fn encode_parameters(values: &[f64]) -> String {
    let body = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";");
    format!("{LENGTH_PREFIX}{}}}{body}", values.len())
}

/// Inverse of [`encode_parameters`]. Fails on a missing prefix, a
/// non-numeric length, an unparsable value, or a value count that differs
/// from the declared length.
pub fn decode_parameters(text: &str) -> NnResult<Vec<f64>> {
    let rest = text
        .strip_prefix(LENGTH_PREFIX)
        .ok_or_else(|| NnError::Format(format!("data must start with {LENGTH_PREFIX}n}}")))?;
    let close = rest
        .find('}')
        .ok_or_else(|| NnError::Format("unterminated length".to_string()))?;

    let digits = &rest[..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NnError::Format(format!("invalid length {digits:?}")));
    }
    let length: usize = digits
        .parse()
        .map_err(|e| NnError::Format(format!("invalid length {digits:?}: {e}")))?;

    let body = &rest[close + 1..];
    if length == 0 {
        return if body.is_empty() {
            Ok(Vec::new())
        } else {
            Err(NnError::Format("data after an empty buffer".to_string()))
        };
    }

    let values = body
        .split(';')
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| NnError::Format(format!("invalid number {s:?}: {e}")))
        })
        .collect::<NnResult<Vec<f64>>>()?;
    if values.len() != length {
        return Err(NnError::Format(format!(
            "declared {length} values, found {}",
            values.len()
        )));
    }
    Ok(values)
}

/// Builds layers from their records.
pub trait LayerFactory {
    fn build(&self, record: &LayerRecord) -> NnResult<Box<dyn Layer>>;
}

/// Factory for the built-in layer kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLayerFactory;

impl LayerFactory for DefaultLayerFactory {
    fn build(&self, record: &LayerRecord) -> NnResult<Box<dyn Layer>> {
        let layer: Box<dyn Layer> = match record.kind {
            LayerKind::Input => Box::new(Input::new(record.input)),
            LayerKind::Flatten => Box::new(Flatten::with_input(record.input)),
            LayerKind::Dense => {
                let params = record.parameters.as_ref().ok_or_else(|| {
                    NnError::Format("dense record without parameters".to_string())
                })?;
                let units = record.output.rows;
                let weights = Tensor::from_vec(
                    Dims::matrix(units, record.input.rows),
                    decode_parameters(&params.weights)?,
                )?;
                let bias = Tensor::from_vec(Dims::matrix(units, 1), decode_parameters(&params.bias)?)?;
                let mut dense = Dense::from_parameters(weights, Some(bias))?
                    .with_activation(record.activation.unwrap_or_default());
                dense.set_input_shape(InputShape::known(record.input))?;
                Box::new(dense)
            }
        };

        let output = layer.output_shape()?;
        if output != record.output {
            return Err(NnError::ShapeMismatch {
                expected: record.output.to_string(),
                actual: output,
            });
        }
        Ok(layer)
    }
}
