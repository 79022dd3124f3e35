//! Classification metrics.

use nnlib_tensor::Tensor;

use crate::error::{NnError, NnResult};

/// Fraction of batch items whose predicted class matches the target class.
///
/// The class of an item is the row holding the largest value of its first
/// depth slice and first column; on ties the lowest row wins.
pub fn accuracy(target: &Tensor, prediction: &Tensor) -> NnResult<f64> {
    if target.dims() != prediction.dims() {
        return Err(NnError::TargetMismatch {
            prediction: prediction.dims(),
            target: target.dims(),
        });
    }
    let batch = target.batch_size();
    let mut hits = 0usize;
    for b in 0..batch {
        if argmax(target, b)? == argmax(prediction, b)? {
            hits += 1;
        }
    }
    Ok(hits as f64 / batch as f64)
}

/// First row holding the maximum of item `b`'s first column.
pub fn argmax(t: &Tensor, b: usize) -> NnResult<usize> {
    let mut best = (0, t.get(b, 0, 0, 0)?);
    for r in 1..t.rows() {
        let v = t.get(b, 0, r, 0)?;
        if v > best.1 {
            best = (r, v);
        }
    }
    Ok(best.0)
}
