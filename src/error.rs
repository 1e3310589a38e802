//! Error taxonomy for rate building, decomposition, projection and calibration
//!
//! None of these are retried locally: each one reflects a structural problem
//! with the input matrices or the configured hyperparameters.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Two matrices that must line up do not, or a cell is structurally missing
    /// (for example a zero exposure)
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },

    /// More latent components requested than the matrix can carry
    #[error("requested {requested} components but the matrix supports at most {max}")]
    InvalidComponentCount { requested: usize, max: usize },

    /// A year-effect series is too short for a damped trend fit
    #[error("component {component} has only {length} observations; at least 2 are required")]
    InsufficientHistory { component: usize, length: usize },

    /// No candidate in the grid produced a finite loss
    #[error("calibration failed after {tried} candidates: {detail}")]
    CalibrationFailed { tried: usize, detail: String },

    /// The stabilizing transform produced an infinite or NaN value
    #[error("non-finite transformed rate {value} at age group {age_group}, year {year}")]
    NonFiniteRate { age_group: usize, year: i32, value: f64 },

    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Singular value decomposition did not converge
    #[error("singular value decomposition did not converge")]
    DecompositionFailed,

    /// LOWESS rejected the series or its settings
    #[error("smoothing failed: {0}")]
    Smoothing(#[from] lowess::prelude::LowessError),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        Self::ShapeMismatch { context: context.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_detail() {
        let err = ForecastError::InvalidComponentCount { requested: 7, max: 5 };
        assert_eq!(
            err.to_string(),
            "requested 7 components but the matrix supports at most 5"
        );

        let err = ForecastError::shape("counts are 3x4, exposures are 3x5");
        assert!(err.to_string().contains("3x5"));
    }
}
