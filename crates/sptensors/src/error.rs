//! Error types for sptensors.

use thiserror::Error;

use crate::scalar::ComponentType;
use crate::tensor::PipelineState;

/// Errors that can occur in tensor storage operations.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Index out of bounds.
    #[error(
        "index out of bounds: index {index} is out of range for dimension {dim} with size {dim_size}"
    )]
    IndexOutOfBounds {
        index: usize,
        dim: usize,
        dim_size: usize,
    },

    /// Two dynamically typed values, or a value and a buffer, disagree on type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ComponentType,
        actual: ComponentType,
    },

    /// A dynamically typed value is not bound to any memory.
    #[error("typed value is not bound to memory")]
    Unbound,

    /// Release requested on memory the handle does not own.
    #[error("typed value does not own its memory location")]
    NotOwned,

    /// Invalid level format.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// Packed storage that breaks the segment/coordinate invariants.
    #[error("invalid packed storage: {message}")]
    InvalidStorage { message: String },

    /// Pipeline stage invoked out of order.
    #[error("cannot {operation} a tensor in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    /// Compile requested without an attached expression.
    #[error("tensor {name} does not have an expression to evaluate")]
    MissingExpression { name: String },

    /// The same coordinate was inserted twice under the reject policy.
    #[error("duplicate coordinate {coordinate:?}")]
    DuplicateCoordinate { coordinate: Vec<usize> },

    /// Level kind or operation that is declared but not implemented.
    #[error("not supported: {what}")]
    NotSupported { what: String },

    /// Mutation requested on a buffer that other views still reference.
    #[error("buffer is shared by {references} references and cannot be mutated")]
    SharedStorage { references: usize },

    /// Error reported by the expression compiler or a compiled kernel.
    #[error("kernel error: {message}")]
    Kernel { message: String },

    /// Malformed text input.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TensorError {
    pub(crate) fn invalid_format(message: impl Into<String>) -> Self {
        TensorError::InvalidFormat {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_storage(message: impl Into<String>) -> Self {
        TensorError::InvalidStorage {
            message: message.into(),
        }
    }

    /// Create a kernel error with a message.
    ///
    /// Intended for compiler and kernel implementations outside this crate.
    pub fn kernel(message: impl Into<String>) -> Self {
        TensorError::Kernel {
            message: message.into(),
        }
    }
}

/// Result type alias for tensor storage operations.
pub type Result<T> = std::result::Result<T, TensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_number_of_indices_message() {
        let err = TensorError::WrongNumberOfIndices {
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "wrong number of indices: expected 2, got 1"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TensorError::InvalidState {
            operation: "evaluate",
            state: PipelineState::Compiled,
        };
        assert_eq!(
            err.to_string(),
            "cannot evaluate a tensor in the compiled state"
        );
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = TensorError::TypeMismatch {
            expected: ComponentType::Double,
            actual: ComponentType::Int,
        };
        assert_eq!(err.to_string(), "type mismatch: expected double, got int");
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TensorError = io.into();
        assert!(matches!(err, TensorError::Io(_)));
    }
}
