//! Error type for layers, losses, optimizers and the network.

use nnlib_tensor::{Dims, ErrorKind, Shape, TensorError};
use thiserror::Error;

/// Errors raised while building, compiling or running a network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NnError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("{component}: backward pass requested without a preceding forward pass")]
    BackwardBeforeForward { component: &'static str },

    #[error("{component} is not compiled")]
    NotCompiled { component: &'static str },

    #[error("input shape cannot change after the layer is compiled")]
    ShapeLocked,

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: Shape },

    #[error("the first layer needs a fully specified input shape")]
    MissingInputShape,

    #[error("no layer may follow a softmax-activated layer")]
    LayerAfterSoftmax,

    #[error("softmax output requires the sparse categorical cross-entropy loss and vice versa")]
    SoftmaxLossPairing,

    #[error("no gradients accumulated since the last weight update")]
    NoAccumulatedGradients,

    #[error("optimizer slot {index}: {reason}")]
    OptimizerSlot { index: usize, reason: &'static str },

    #[error("softmax expects a column vector per item (depth 1, columns 1), got {0}")]
    UnsupportedSoftmaxShape(Dims),

    #[error("prediction {prediction} and target {target} do not match")]
    TargetMismatch { prediction: Dims, target: Dims },

    #[error("malformed parameter encoding: {0}")]
    Format(String),

    #[error("dataset: {0}")]
    Dataset(String),

    #[error("network has no layers")]
    EmptyNetwork,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl NnError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NnError::Tensor(e) => e.kind(),
            NnError::ShapeMismatch { .. }
            | NnError::TargetMismatch { .. }
            | NnError::Format(_) => ErrorKind::Format,
            NnError::InvalidArgument(_) => ErrorKind::Range,
            NnError::UnsupportedSoftmaxShape(_) => ErrorKind::Unsupported,
            NnError::BackwardBeforeForward { .. }
            | NnError::NotCompiled { .. }
            | NnError::ShapeLocked
            | NnError::MissingInputShape
            | NnError::LayerAfterSoftmax
            | NnError::SoftmaxLossPairing
            | NnError::NoAccumulatedGradients
            | NnError::OptimizerSlot { .. }
            | NnError::Dataset(_)
            | NnError::EmptyNetwork => ErrorKind::InvalidOperation,
        }
    }
}

pub type NnResult<T> = Result<T, NnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_errors_keep_their_kind() {
        let err: NnError = TensorError::InvalidDimensions {
            dims: Dims::new(0, 1, 1, 1),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn test_messages() {
        let err = NnError::BackwardBeforeForward { component: "relu" };
        assert!(err.to_string().starts_with("relu:"));
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }
}
