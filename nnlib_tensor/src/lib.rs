//! # nnlib_tensor - Batched 4D Tensors
//!
//! The numeric value type of the `nnlib` training library: a dense
//! `(batch, depth, row, column)` array of `f64` with batched matrix
//! multiplication, two broadcasting modes for addition and subtraction,
//! reductions and element maps.
//!
//! ## Overview
//!
//! - [`Dims`] and [`Shape`] - full tensor extent and per-item shape
//! - [`Tensor`] - immutable-once-built storage; every operator allocates
//! - [`MultiplicationMode`] - depth broadcasting rule of the left operand
//! - [`TensorError`] - construction and operator failures, categorized by [`ErrorKind`]
//!
//! Element-independent kernels run on the rayon pool once a buffer reaches
//! [`PARALLEL_THRESHOLD`] elements.
//!
//! ## Example
//!
//! ```
//! use nnlib_tensor::prelude::*;
//!
//! let w = Tensor::matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! let x = Tensor::column(&[1.0, 1.0]).unwrap();
//! let b = Tensor::column(&[0.5, -0.5]).unwrap();
//!
//! let y = (&(&w * &x).unwrap() + &b).unwrap();
//! assert_eq!(y.as_slice(), &[3.5, 6.5]);
//! ```

pub mod error;
pub mod ops;
pub mod parallel;
pub mod shape;
pub mod tensor;

pub use error::{ErrorKind, TensorError, TensorResult};
pub use ops::ShapeCheck;
pub use parallel::PARALLEL_THRESHOLD;
pub use shape::{Dims, Shape};
pub use tensor::{MultiplicationMode, Tensor};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorKind, TensorError, TensorResult};
    pub use crate::ops::ShapeCheck;
    pub use crate::shape::{Dims, Shape};
    pub use crate::tensor::{MultiplicationMode, Tensor};
}
