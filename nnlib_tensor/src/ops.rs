//! Tensor operators: batched matmul, broadcasting add/sub, reductions, maps.
//!
//! Every operator allocates its result. Element-independent work is
//! dispatched through [`crate::parallel`].

use std::ops::{Add, Mul, Sub};

use crate::error::{TensorError, TensorResult};
use crate::parallel;
use crate::shape::Dims;
use crate::tensor::{MultiplicationMode, Tensor};

/// Whether a binary map validates operand shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeCheck {
    /// Operands must have identical dimensions.
    Enforce,
    /// The caller already validated shapes; only element counts are compared.
    Skip,
}

impl Tensor {
    // === Multiplication ===

    /// Batched matrix product `self * rhs`.
    ///
    /// - Equal batch sizes multiply item by item; unequal batch sizes are
    ///   accepted only when `self` has batch 1 and broadcasts over `rhs`.
    ///   A batch-1 `rhs` does not broadcast into a larger `self`.
    /// - Equal depths multiply slice by slice. A depth-1 `self` in
    ///   [`MultiplicationMode::LastLevel`] multiplies only the last depth
    ///   slice of `rhs` and yields depth 1.
    pub fn matmul(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        const OP: &str = "multiplication";
        let (l, r) = (self.dims(), rhs.dims());

        if l.columns != r.rows {
            return Err(TensorError::ShapeMismatch {
                op: OP,
                left: l,
                right: r,
            });
        }

        let broadcast_left = if l.batch == r.batch {
            false
        } else if l.batch == 1 {
            true
        } else {
            return Err(TensorError::IncompatibleBatch {
                op: OP,
                left: l.batch,
                right: r.batch,
            });
        };

        let same_depth = l.depth == r.depth;
        let depth = if same_depth {
            l.depth
        } else if l.depth == 1 && self.mode() == MultiplicationMode::LastLevel {
            1
        } else {
            return Err(TensorError::Unsupported {
                op: OP,
                left: l,
                right: r,
            });
        };

        let out_dims = Dims::new(r.batch, depth, l.rows, r.columns);

        // Start offsets of the (left, right) matrices for every output slice.
        let slices: Vec<(usize, usize)> = (0..r.batch)
            .flat_map(|b| {
                (0..depth).map(move |d| {
                    let lb = if broadcast_left { 0 } else { b };
                    if same_depth {
                        (l.offset(lb, d, 0, 0), r.offset(b, d, 0, 0))
                    } else {
                        (l.offset(lb, 0, 0, 0), r.offset(b, r.depth - 1, 0, 0))
                    }
                })
            })
            .collect();

        let (inner, n, m) = (l.columns, r.columns, l.rows);
        let (a, b) = (self.as_slice(), rhs.as_slice());
        let mut out = vec![0.0; out_dims.numel()];
        parallel::fill_chunks(&mut out, n, |row_index, out_row| {
            let (a_off, b_off) = slices[row_index / m];
            let i = row_index % m;
            let a_row = &a[a_off + i * inner..a_off + (i + 1) * inner];
            for (j, o) in out_row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &av) in a_row.iter().enumerate() {
                    acc += av * b[b_off + k * n + j];
                }
                *o = acc;
            }
        });

        Ok(Tensor::from_parts(out_dims, out))
    }

    /// Every element multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|v| v * factor)
    }

    // === Elementwise add / subtract ===

    /// `self + rhs` with the broadcasting rules of [`Tensor::try_sub`].
    pub fn try_add(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.elementwise(rhs, "addition", |x, y| x + y)
    }

    /// `self - rhs`.
    ///
    /// Rows must match. Two layouts are accepted:
    /// 1. identical depth and columns, with equal batch sizes or a batch-1
    ///    `rhs` broadcast over every item of `self`;
    /// 2. a single-column `rhs` with matching depth and compatible batch,
    ///    whose per-row scalar applies to every column of `self` (bias add).
    pub fn try_sub(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.elementwise(rhs, "subtraction", |x, y| x - y)
    }

    fn elementwise<F>(&self, rhs: &Tensor, op: &'static str, f: F) -> TensorResult<Tensor>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        let (l, r) = (self.dims(), rhs.dims());
        if l.rows != r.rows {
            return Err(TensorError::ShapeMismatch {
                op,
                left: l,
                right: r,
            });
        }

        let batch_ok = l.batch == r.batch || r.batch == 1;
        let (a, b) = (self.as_slice(), rhs.as_slice());
        let mut out = vec![0.0; l.numel()];

        if batch_ok && l.depth == r.depth && l.columns == r.columns {
            if r.batch == l.batch {
                parallel::fill(&mut out, |i| f(a[i], b[i]));
            } else {
                let drc = r.depth_rows_columns();
                parallel::fill(&mut out, |i| f(a[i], b[i % drc]));
            }
        } else if batch_ok && l.depth == r.depth && r.columns == 1 {
            let cols = l.columns;
            parallel::fill_chunks(&mut out, cols, |row_index, out_row| {
                let b_index = row_index / (l.depth * l.rows);
                let d = (row_index / l.rows) % l.depth;
                let row = row_index % l.rows;
                let rb = if r.batch == 1 { 0 } else { b_index };
                let scalar = b[r.offset(rb, d, row, 0)];
                let start = row_index * cols;
                for (c, o) in out_row.iter_mut().enumerate() {
                    *o = f(a[start + c], scalar);
                }
            });
        } else if !batch_ok {
            return Err(TensorError::IncompatibleBatch {
                op,
                left: l.batch,
                right: r.batch,
            });
        } else {
            return Err(TensorError::Unsupported {
                op,
                left: l,
                right: r,
            });
        }

        Ok(Tensor::from_parts(l, out))
    }

    // === Shape ===

    /// Swaps rows and columns of every (batch, depth) slice.
    pub fn transpose(&self) -> Tensor {
        let d = self.dims();
        let out_dims = Dims::new(d.batch, d.depth, d.columns, d.rows);
        let (rows, cols, rc) = (d.rows, d.columns, d.rows_columns());
        let a = self.as_slice();

        let mut out = vec![0.0; out_dims.numel()];
        parallel::fill_chunks(&mut out, rows, |row_index, out_row| {
            let base = (row_index / cols) * rc;
            let c = row_index % cols;
            for (r, o) in out_row.iter_mut().enumerate() {
                *o = a[base + r * cols + c];
            }
        });
        Tensor::from_parts(out_dims, out)
    }

    /// Linear copy of the buffer into new dimensions with the same element count.
    pub fn reshape(&self, dims: Dims) -> TensorResult<Tensor> {
        if dims.has_zero() {
            return Err(TensorError::InvalidDimensions { dims });
        }
        if dims.numel() != self.len() {
            return Err(TensorError::ReshapeMismatch {
                from: self.dims(),
                to: dims,
            });
        }
        let mut out = vec![0.0; dims.numel()];
        parallel::copy(self.as_slice(), &mut out);
        Ok(Tensor::from_parts(dims, out))
    }

    // === Reductions ===

    /// Collapses columns to 1 by summing each row.
    pub fn sum_rows(&self) -> Tensor {
        let d = self.dims();
        if d.columns == 1 {
            return self.copy();
        }
        let out_dims = Dims::new(d.batch, d.depth, d.rows, 1);
        let (cols, a) = (d.columns, self.as_slice());
        let mut out = vec![0.0; out_dims.numel()];
        parallel::fill(&mut out, |i| a[i * cols..(i + 1) * cols].iter().sum());
        Tensor::from_parts(out_dims, out)
    }

    /// Collapses the batch axis to 1 by summing all batch items.
    pub fn sum_batch(&self) -> Tensor {
        let d = self.dims();
        if d.batch == 1 {
            return self.copy();
        }
        let out_dims = Dims::new(1, d.depth, d.rows, d.columns);
        let (drc, batch, a) = (d.depth_rows_columns(), d.batch, self.as_slice());
        let mut out = vec![0.0; out_dims.numel()];
        parallel::fill(&mut out, |i| (0..batch).map(|b| a[b * drc + i]).sum());
        Tensor::from_parts(out_dims, out)
    }

    // === Maps ===

    /// `f` applied to every element.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let a = self.as_slice();
        let mut out = vec![0.0; self.len()];
        parallel::fill(&mut out, |i| f(a[i]));
        Tensor::from_parts(self.dims(), out)
    }

    /// `f(self[i], aux[i])` for every element.
    pub fn zip_map<F>(&self, aux: &Tensor, check: ShapeCheck, f: F) -> TensorResult<Tensor>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        self.check_zip(aux, check, "elementwise map")?;
        let (a, b) = (self.as_slice(), aux.as_slice());
        let mut out = vec![0.0; self.len()];
        parallel::fill(&mut out, |i| f(a[i], b[i]));
        Ok(Tensor::from_parts(self.dims(), out))
    }

    /// Sum of `f(self[i], aux[i])`, reduced with per-worker partial sums.
    pub fn zip_sum<F>(&self, aux: &Tensor, check: ShapeCheck, f: F) -> TensorResult<f64>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        self.check_zip(aux, check, "elementwise sum")?;
        Ok(parallel::zip_sum(self.as_slice(), aux.as_slice(), f))
    }

    fn check_zip(&self, aux: &Tensor, check: ShapeCheck, op: &'static str) -> TensorResult<()> {
        let mismatch = match check {
            ShapeCheck::Enforce => self.dims() != aux.dims(),
            ShapeCheck::Skip => self.len() != aux.len(),
        };
        if mismatch {
            return Err(TensorError::ShapeMismatch {
                op,
                left: self.dims(),
                right: aux.dims(),
            });
        }
        Ok(())
    }

    /// All-zero tensor with the same dimensions.
    pub fn zero_out(&self) -> Tensor {
        Tensor::from_parts(self.dims(), vec![0.0; self.len()])
    }

    fn copy(&self) -> Tensor {
        let mut out = vec![0.0; self.len()];
        parallel::copy(self.as_slice(), &mut out);
        Tensor::from_parts(self.dims(), out)
    }
}

// === Operator overloading ===

impl Mul<&Tensor> for &Tensor {
    type Output = TensorResult<Tensor>;

    fn mul(self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.matmul(rhs)
    }
}

impl Add<&Tensor> for &Tensor {
    type Output = TensorResult<Tensor>;

    fn add(self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.try_add(rhs)
    }
}

impl Sub<&Tensor> for &Tensor {
    type Output = TensorResult<Tensor>;

    fn sub(self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.try_sub(rhs)
    }
}

impl Mul<&Tensor> for f64 {
    type Output = Tensor;

    fn mul(self, rhs: &Tensor) -> Tensor {
        rhs.scale(self)
    }
}

impl Mul<Tensor> for f64 {
    type Output = Tensor;

    fn mul(self, rhs: Tensor) -> Tensor {
        rhs.scale(self)
    }
}
