//! Finite-difference gradient checking.
//!
//! Used to validate analytic layer gradients: perturb one parameter at a time
//! and compare the central-difference slope of the loss against the
//! gradient the backward pass produced.

use crate::error::{NnError, NnResult};

/// Numerical gradient of `f` at `point` by central differences.
///
/// `f` is fallible so it can run a network forward pass directly.
pub fn finite_diff_grad<F>(mut f: F, point: &[f64], eps: f64) -> NnResult<Vec<f64>>
where
    F: FnMut(&[f64]) -> NnResult<f64>,
{
    let n = point.len();
    let mut grads = Vec::with_capacity(n);
    let mut perturbed = point.to_vec();

    for i in 0..n {
        // Central difference: (f(x + eps) - f(x - eps)) / (2 * eps)
        perturbed[i] = point[i] + eps;
        let f_plus = f(&perturbed)?;

        perturbed[i] = point[i] - eps;
        let f_minus = f(&perturbed)?;

        perturbed[i] = point[i]; // restore

        grads.push((f_plus - f_minus) / (2.0 * eps));
    }

    Ok(grads)
}

/// Maximum absolute difference between two gradient vectors.
pub fn max_grad_error(grad1: &[f64], grad2: &[f64]) -> NnResult<f64> {
    if grad1.len() != grad2.len() {
        return Err(NnError::InvalidArgument(format!(
            "gradients of length {} and {} cannot be compared",
            grad1.len(),
            grad2.len()
        )));
    }
    Ok(grad1
        .iter()
        .zip(grad2.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max))
}
