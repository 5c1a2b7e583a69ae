//! Error types for Umbral operations.
//!
//! All errors in this crate are programmer or configuration errors that
//! surface immediately; there are no transient or retryable classes.

use std::fmt;

/// Main error type for Umbral operations.
///
/// # Examples
///
/// ```
/// use umbral::error::UmbralError;
///
/// let err = UmbralError::ShapeMismatch {
///     expected: "6 channels".to_string(),
///     actual: "4 channels".to_string(),
/// };
/// assert!(err.to_string().contains("Shape mismatch"));
/// ```
#[derive(Debug)]
pub enum UmbralError {
    /// A block specification contains a non-positive dimension.
    InvalidSpec {
        /// Index of the offending block
        block: usize,
        /// Dimension found
        dim: usize,
    },

    /// Tensor shape does not match the configured block specification.
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape found
        actual: String,
    },

    /// Backward invoked without a matching prior forward.
    InvalidState {
        /// What was violated
        reason: String,
    },
}

impl fmt::Display for UmbralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UmbralError::InvalidSpec { block, dim } => {
                write!(
                    f,
                    "Invalid block spec: block {block} has dimension {dim}, expected a positive integer"
                )
            }
            UmbralError::ShapeMismatch { expected, actual } => {
                write!(f, "Shape mismatch: expected {expected}, got {actual}")
            }
            UmbralError::InvalidState { reason } => {
                write!(f, "Invalid operator state: {reason}")
            }
        }
    }
}

impl std::error::Error for UmbralError {}

impl UmbralError {
    /// Create a shape mismatch error with descriptive context.
    #[must_use]
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, UmbralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_spec_display() {
        let err = UmbralError::InvalidSpec { block: 2, dim: 0 };
        let msg = err.to_string();
        assert!(msg.contains("Invalid block spec"));
        assert!(msg.contains("block 2"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = UmbralError::shape_mismatch("6 channels", "4 channels");
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch"));
        assert!(msg.contains("6 channels"));
        assert!(msg.contains("4 channels"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = UmbralError::InvalidState {
            reason: "no pending context".to_string(),
        };
        assert!(err.to_string().contains("Invalid operator state"));
        assert!(err.to_string().contains("no pending context"));
    }
}
