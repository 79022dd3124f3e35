//! Data-parallel kernels over flat `f64` buffers.
//!
//! Every helper writes each output element (or row) from disjoint inputs, so
//! the work fans out across the rayon pool without synchronization. Buffers
//! shorter than [`PARALLEL_THRESHOLD`] run sequentially.

use rayon::prelude::*;

/// Element count above which tensor kernels dispatch to the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 256;

/// `out[i] = f(i)` for every index.
pub(crate) fn fill<F>(out: &mut [f64], f: F)
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    if out.len() >= PARALLEL_THRESHOLD {
        out.par_iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
    } else {
        for (i, v) in out.iter_mut().enumerate() {
            *v = f(i);
        }
    }
}

/// Calls `f(chunk_index, chunk)` for consecutive chunks of `chunk_len` elements.
pub(crate) fn fill_chunks<F>(out: &mut [f64], chunk_len: usize, f: F)
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    if chunk_len == 0 {
        return;
    }
    if out.len() >= PARALLEL_THRESHOLD {
        out.par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, chunk)| f(i, chunk));
    } else {
        for (i, chunk) in out.chunks_mut(chunk_len).enumerate() {
            f(i, chunk);
        }
    }
}

/// `out[i] = from[i]`.
pub(crate) fn copy(from: &[f64], out: &mut [f64]) {
    debug_assert_eq!(from.len(), out.len());
    if out.len() >= PARALLEL_THRESHOLD {
        out.par_iter_mut()
            .zip(from.par_iter())
            .for_each(|(o, &v)| *o = v);
    } else {
        out.copy_from_slice(from);
    }
}

/// Sum of `f(a[i], b[i])`.
///
/// Above the threshold this is a rayon reduction: each worker folds its own
/// partial sum and the partials are combined at the end.
pub(crate) fn zip_sum<F>(a: &[f64], b: &[f64], f: F) -> f64
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    if a.len() >= PARALLEL_THRESHOLD {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(&x, &y)| f(x, y))
            .sum()
    } else {
        a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).sum()
    }
}
