//! Parameter initializers and the random source they draw from.

use nnlib_tensor::{Dims, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{NnError, NnResult};

/// Random source threaded through layer compilation.
///
/// A network owns exactly one; seeding it makes every initialization
/// reproducible.
#[derive(Debug, Clone)]
pub struct InitRng(StdRng);

impl InitRng {
    pub fn seeded(seed: u64) -> Self {
        InitRng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        InitRng(StdRng::from_entropy())
    }
}

/// How a parameter tensor is filled when its layer compiles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Initializer {
    Zeros,
    Constant(f64),
    /// Samples from N(0, 1).
    StandardNormal,
    /// Glorot/Xavier uniform: U(-l, l) with `l = sqrt(6 / (fan_in + fan_out))`.
    #[default]
    GlorotUniform,
    Uniform { low: f64, high: f64 },
}

impl Initializer {
    /// Build a tensor of `dims` for a parameter with the given fan-in and fan-out.
    pub fn tensor(
        &self,
        dims: Dims,
        fan_in: usize,
        fan_out: usize,
        rng: &mut InitRng,
    ) -> NnResult<Tensor> {
        let rng = &mut rng.0;
        let tensor = match *self {
            Initializer::Zeros => Tensor::zeros(dims)?,
            Initializer::Constant(value) => Tensor::from_fn(dims, || value)?,
            Initializer::StandardNormal => {
                let normal = Normal::new(0.0, 1.0)
                    .map_err(|e| NnError::InvalidArgument(e.to_string()))?;
                Tensor::from_fn(dims, || normal.sample(rng))?
            }
            Initializer::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                Tensor::from_fn(dims, || rng.gen_range(-limit..limit))?
            }
            Initializer::Uniform { low, high } => {
                if !(low < high) {
                    return Err(NnError::InvalidArgument(format!(
                        "uniform initializer needs low < high, got [{low}, {high})"
                    )));
                }
                Tensor::from_fn(dims, || rng.gen_range(low..high))?
            }
        };
        Ok(tensor)
    }
}
