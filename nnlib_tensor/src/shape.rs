//! Dimension and shape utilities for tensors.

use std::fmt;

/// Full 4D extent of a tensor: (batch, depth, rows, columns).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims {
    pub batch: usize,
    pub depth: usize,
    pub rows: usize,
    pub columns: usize,
}

impl Dims {
    /// Create dimensions from the four extents.
    pub const fn new(batch: usize, depth: usize, rows: usize, columns: usize) -> Self {
        Dims {
            batch,
            depth,
            rows,
            columns,
        }
    }

    /// Dimensions of a single `rows x columns` matrix (batch 1, depth 1).
    pub const fn matrix(rows: usize, columns: usize) -> Self {
        Dims::new(1, 1, rows, columns)
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.batch * self.depth * self.rows * self.columns
    }

    /// Stride of one depth slice (`rows * columns`).
    pub fn rows_columns(&self) -> usize {
        self.rows * self.columns
    }

    /// Stride of one batch item (`depth * rows * columns`).
    pub fn depth_rows_columns(&self) -> usize {
        self.depth * self.rows_columns()
    }

    /// Whether any extent is zero.
    pub fn has_zero(&self) -> bool {
        self.batch == 0 || self.depth == 0 || self.rows == 0 || self.columns == 0
    }

    /// Shape of one batch item.
    pub fn item(&self) -> Shape {
        Shape::new(self.depth, self.rows, self.columns)
    }

    /// Flat row-major offset of `(b, d, r, c)`. Does not bounds-check.
    #[inline]
    pub fn offset(&self, b: usize, d: usize, r: usize, c: usize) -> usize {
        b * self.depth_rows_columns() + d * self.rows_columns() + r * self.columns + c
    }

    /// Whether `(b, d, r, c)` addresses an element inside these dimensions.
    pub fn contains(&self, b: usize, d: usize, r: usize, c: usize) -> bool {
        b < self.batch && d < self.depth && r < self.rows && c < self.columns
    }
}

impl fmt::Debug for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dims({})", self)
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            self.batch, self.depth, self.rows, self.columns
        )
    }
}

/// Shape of a single batch item: (depth, rows, columns).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub depth: usize,
    pub rows: usize,
    pub columns: usize,
}

impl Shape {
    pub const fn new(depth: usize, rows: usize, columns: usize) -> Self {
        Shape {
            depth,
            rows,
            columns,
        }
    }

    /// A column vector of `rows` elements (depth 1, columns 1).
    pub const fn column(rows: usize) -> Self {
        Shape::new(1, rows, 1)
    }

    /// Number of elements in one item.
    pub fn numel(&self) -> usize {
        self.depth * self.rows * self.columns
    }

    /// Extend to full dimensions with the given batch size.
    pub fn with_batch(&self, batch: usize) -> Dims {
        Dims::new(batch, self.depth, self.rows, self.columns)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({})", self)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.rows, self.columns)
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((depth, rows, columns): (usize, usize, usize)) -> Self {
        Shape::new(depth, rows, columns)
    }
}
