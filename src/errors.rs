//! Error types and validation functions for GMM statistics accumulation.
//!
//! The taxonomy separates fatal conditions (malformed model or archive,
//! internal invariant violations) from per-utterance conditions that the
//! driver handles by skipping the utterance and continuing. Only the fatal
//! conditions live here; per-utterance skips are modeled as an outcome type
//! in the driver, not as errors.

use thiserror::Error;

/// Error types for model loading, archive I/O, and accumulation.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum GmmStatsError {
    /// Feature or parameter vector has the wrong dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        actual: usize,
    },

    /// Invalid scalar parameter value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Model file is structurally invalid.
    #[error("Invalid model: {reason}")]
    InvalidModel {
        /// Detailed reason
        reason: String,
    },

    /// Candidate component index outside the model's component range.
    #[error("Component index {index} out of range for model with {num_comps} components")]
    ComponentOutOfRange {
        /// Offending index
        index: usize,
        /// Number of components in the model
        num_comps: usize,
    },

    /// Archive stream or file does not parse.
    #[error("Malformed archive {path}: {reason}")]
    ArchiveFormat {
        /// Path of the offending file
        path: String,
        /// Parse failure detail
        reason: String,
    },

    /// Underlying I/O failure.
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path of the offending file
        path: String,
        /// OS-level detail
        reason: String,
    },

    /// A caller contract was broken, e.g. an empty candidate set reached the
    /// scorer. Always fatal.
    #[error("Internal invariant violated: {reason}")]
    InternalInvariant {
        /// Description of the violated invariant
        reason: String,
    },
}

/// Result type for all accumulation operations.
pub type GmmResult<T> = Result<T, GmmStatsError>;

/// Validates that a vector has the expected dimension.
pub fn validate_dimension(expected: usize, actual: usize) -> GmmResult<()> {
    if expected != actual {
        Err(GmmStatsError::DimensionMismatch { expected, actual })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is within expected bounds (inclusive).
///
/// NaN values are rejected with an explicit constraint message rather than
/// falling through a comparison.
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> GmmResult<()> {
    if value.is_nan() {
        return Err(GmmStatsError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if value < min || value > max {
        Err(GmmStatsError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that every entry of a slice is finite.
pub fn validate_all_finite(data: &[f64], name: &str) -> GmmResult<()> {
    for (i, &value) in data.iter().enumerate() {
        if !value.is_finite() {
            return Err(GmmStatsError::InvalidParameter {
                parameter: format!("{}[{}]", name, i),
                value,
                constraint: "must be finite".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dimension() {
        assert!(validate_dimension(3, 3).is_ok());
        let err = validate_dimension(3, 4).unwrap_err();
        assert!(matches!(
            err,
            GmmStatsError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_validate_parameter_bounds() {
        assert!(validate_parameter(0.5, 0.0, 1.0, "weight").is_ok());
        assert!(validate_parameter(0.0, 0.0, 1.0, "weight").is_ok());
        assert!(validate_parameter(-0.1, 0.0, 1.0, "weight").is_err());
        assert!(validate_parameter(f64::NAN, 0.0, 1.0, "weight").is_err());
    }

    #[test]
    fn test_validate_all_finite() {
        assert!(validate_all_finite(&[1.0, -2.0, 0.0], "v").is_ok());
        assert!(validate_all_finite(&[1.0, f64::INFINITY], "v").is_err());
        assert!(validate_all_finite(&[f64::NAN], "v").is_err());
    }
}
