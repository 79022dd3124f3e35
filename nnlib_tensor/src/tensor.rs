//! The batched 4D tensor value type.

use std::fmt;

use crate::error::{TensorError, TensorResult};
use crate::parallel;
use crate::shape::{Dims, Shape};

/// How the left operand of a multiplication treats a depth mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MultiplicationMode {
    /// Depth slices are multiplied pairwise; depths must match.
    #[default]
    OnlySameDepth,
    /// A depth-1 left operand multiplies only the last depth slice of the
    /// right operand.
    LastLevel,
}

/// Dense 4D array of `f64` addressed by `(batch, depth, row, column)`.
///
/// Storage is one contiguous row-major buffer whose length always equals
/// `batch * depth * rows * columns`. Operators never mutate their operands;
/// every operation allocates a fresh result.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    dims: Dims,
    mode: MultiplicationMode,
}

impl Tensor {
    /// Internal constructor; callers guarantee `data.len() == dims.numel()`.
    pub(crate) fn from_parts(dims: Dims, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), dims.numel());
        Tensor {
            data,
            dims,
            mode: MultiplicationMode::default(),
        }
    }

    fn check_dims(dims: Dims) -> TensorResult<()> {
        if dims.has_zero() {
            return Err(TensorError::InvalidDimensions { dims });
        }
        Ok(())
    }

    // === Constructors ===

    /// All-zero tensor.
    pub fn zeros(dims: Dims) -> TensorResult<Self> {
        Self::check_dims(dims)?;
        Ok(Self::from_parts(dims, vec![0.0; dims.numel()]))
    }

    /// Tensor whose elements are drawn in buffer order from `init`.
    pub fn from_fn<F>(dims: Dims, mut init: F) -> TensorResult<Self>
    where
        F: FnMut() -> f64,
    {
        Self::check_dims(dims)?;
        let data = (0..dims.numel()).map(|_| init()).collect();
        Ok(Self::from_parts(dims, data))
    }

    /// Tensor over an existing row-major buffer.
    pub fn from_vec(dims: Dims, data: Vec<f64>) -> TensorResult<Self> {
        Self::check_dims(dims)?;
        if data.len() != dims.numel() {
            return Err(TensorError::DataLength {
                expected: dims.numel(),
                actual: data.len(),
            });
        }
        Ok(Self::from_parts(dims, data))
    }

    /// One flat `depth * rows * columns` array per batch item.
    pub fn from_batches(
        depth: usize,
        rows: usize,
        columns: usize,
        items: &[Vec<f64>],
    ) -> TensorResult<Self> {
        let dims = Dims::new(items.len(), depth, rows, columns);
        Self::check_dims(dims)?;

        let item_len = dims.depth_rows_columns();
        if let Some((item, bad)) = items.iter().enumerate().find(|(_, v)| v.len() != item_len) {
            return Err(TensorError::LengthMismatch {
                item,
                expected: item_len,
                actual: bad.len(),
            });
        }

        let mut data = vec![0.0; dims.numel()];
        parallel::fill_chunks(&mut data, item_len, |b, chunk| {
            chunk.copy_from_slice(&items[b]);
        });
        Ok(Self::from_parts(dims, data))
    }

    /// Tensor from a nested `[batch][depth][row][column]` literal.
    pub fn from_nested(data: &[Vec<Vec<Vec<f64>>>]) -> TensorResult<Self> {
        let batch = data.len();
        let depth = data.first().map_or(0, |d| d.len());
        let rows = data
            .first()
            .and_then(|d| d.first())
            .map_or(0, |r| r.len());
        let columns = data
            .first()
            .and_then(|d| d.first())
            .and_then(|r| r.first())
            .map_or(0, |c| c.len());
        let dims = Dims::new(batch, depth, rows, columns);
        Self::check_dims(dims)?;

        let mut tensor = Self::from_parts(dims, vec![0.0; dims.numel()]);
        for (b, item) in data.iter().enumerate() {
            if item.len() != depth {
                return Err(TensorError::RaggedArray(format!(
                    "batch item {b} has depth {}, expected {depth}",
                    item.len()
                )));
            }
            for (d, slice) in item.iter().enumerate() {
                if slice.len() != rows {
                    return Err(TensorError::RaggedArray(format!(
                        "slice ({b}, {d}) has {} rows, expected {rows}",
                        slice.len()
                    )));
                }
                for (r, row) in slice.iter().enumerate() {
                    if row.len() != columns {
                        return Err(TensorError::RaggedArray(format!(
                            "row ({b}, {d}, {r}) has {} columns, expected {columns}",
                            row.len()
                        )));
                    }
                    for (c, &value) in row.iter().enumerate() {
                        tensor.set(b, d, r, c, value);
                    }
                }
            }
        }
        Ok(tensor)
    }

    /// Single `rows x columns` matrix (batch 1, depth 1) from row slices.
    pub fn matrix(rows: &[Vec<f64>]) -> TensorResult<Self> {
        Self::from_nested(&[vec![rows.to_vec()]])
    }

    /// Column vector `(1, 1, n, 1)`.
    pub fn column(values: &[f64]) -> TensorResult<Self> {
        Self::from_vec(Dims::new(1, 1, values.len(), 1), values.to_vec())
    }

    // === Accessors ===

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn batch_size(&self) -> usize {
        self.dims.batch
    }

    pub fn depth(&self) -> usize {
        self.dims.depth
    }

    pub fn rows(&self) -> usize {
        self.dims.rows
    }

    pub fn columns(&self) -> usize {
        self.dims.columns
    }

    /// Shape of one batch item.
    pub fn item_shape(&self) -> Shape {
        self.dims.item()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mode(&self) -> MultiplicationMode {
        self.mode
    }

    /// Same tensor with a different multiplication mode.
    pub fn with_mode(mut self, mode: MultiplicationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Row-major view of the backing buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Bounds-checked element read.
    pub fn get(&self, batch: usize, depth: usize, row: usize, column: usize) -> TensorResult<f64> {
        if !self.dims.contains(batch, depth, row, column) {
            return Err(TensorError::IndexOutOfRange {
                batch,
                depth,
                row,
                column,
                dims: self.dims,
            });
        }
        Ok(self.data[self.dims.offset(batch, depth, row, column)])
    }

    /// Owner-only element write used while building a fresh tensor.
    pub(crate) fn set(&mut self, batch: usize, depth: usize, row: usize, column: usize, value: f64) {
        let offset = self.dims.offset(batch, depth, row, column);
        self.data[offset] = value;
    }

    // === Depth slicing ===

    /// The last depth slice of every batch item as a depth-1 tensor.
    pub fn last_level(&self) -> Tensor {
        let dims = Dims::new(self.dims.batch, 1, self.dims.rows, self.dims.columns);
        let rc = self.dims.rows_columns();
        let drc = self.dims.depth_rows_columns();
        let skip = (self.dims.depth - 1) * rc;

        let mut out = vec![0.0; dims.numel()];
        parallel::fill_chunks(&mut out, rc, |b, chunk| {
            let start = b * drc + skip;
            chunk.copy_from_slice(&self.data[start..start + rc]);
        });
        Tensor::from_parts(dims, out)
    }

    /// Embeds a depth-1 tensor as the last slice of a `depth`-deep tensor,
    /// zero elsewhere. Inverse of [`Tensor::last_level`] on that slice.
    pub fn expand_last_level(&self, depth: usize) -> TensorResult<Tensor> {
        let dims = Dims::new(self.dims.batch, depth, self.dims.rows, self.dims.columns);
        if self.dims.depth != 1 {
            return Err(TensorError::Unsupported {
                op: "expand last level",
                left: self.dims,
                right: dims,
            });
        }
        Self::check_dims(dims)?;

        let rc = self.dims.rows_columns();
        let mut out = vec![0.0; dims.numel()];
        parallel::fill_chunks(&mut out, rc, |slice, chunk| {
            if slice % depth == depth - 1 {
                let b = slice / depth;
                chunk.copy_from_slice(&self.data[b * rc..(b + 1) * rc]);
            }
        });
        Ok(Tensor::from_parts(dims, out))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dims", &self.dims)
            .field("mode", &self.mode)
            .finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.dims;
        for b in 0..d.batch {
            writeln!(f, "Batch {b} :")?;
            for depth in 0..d.depth {
                writeln!(f, "Depth {depth} :")?;
                for r in 0..d.rows {
                    let start = d.offset(b, depth, r, 0);
                    let row = &self.data[start..start + d.columns];
                    for (c, v) in row.iter().enumerate() {
                        if c + 1 < row.len() {
                            write!(f, "{v:>3},")?;
                        } else {
                            writeln!(f, "{v:>3}")?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
