//! Variance-stabilizing transforms applied before decomposition
//!
//! Mortality uses a plain natural log. Fertility uses Box-Cox with a
//! caller-supplied lambda, which degenerates to the log at lambda = 0.

use serde::{Deserialize, Serialize};

use super::matrix::RateMatrix;
use crate::error::{ForecastError, Result};

/// Stabilizing transform and its inverse
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateTransform {
    /// y = ln(x)
    Log,
    /// y = (x^lambda - 1) / lambda, ln(x) when lambda == 0
    BoxCox { lambda: f64 },
}

impl RateTransform {
    pub fn forward(&self, x: f64) -> f64 {
        match *self {
            Self::Log => x.ln(),
            Self::BoxCox { lambda } if lambda == 0.0 => x.ln(),
            Self::BoxCox { lambda } => (x.powf(lambda) - 1.0) / lambda,
        }
    }

    /// Inverse transform; NaN where the inverse is undefined
    pub fn inverse(&self, y: f64) -> f64 {
        match *self {
            Self::Log => y.exp(),
            Self::BoxCox { lambda } if lambda == 0.0 => y.exp(),
            Self::BoxCox { lambda } => {
                let base = lambda * y + 1.0;
                // powf of a negative base is real for even reciprocals; still undefined here
                if base < 0.0 {
                    f64::NAN
                } else {
                    base.powf(1.0 / lambda)
                }
            }
        }
    }

    /// Box-Cox parameter, if any
    pub fn lambda(&self) -> Option<f64> {
        match *self {
            Self::Log => None,
            Self::BoxCox { lambda } => Some(lambda),
        }
    }

    /// Transform every cell, failing on the first non-finite result
    pub fn apply(&self, rates: &RateMatrix) -> Result<RateMatrix> {
        let transformed = rates.map(|x| self.forward(x));
        let values = transformed.values();
        for j in 0..values.ncols() {
            for i in 0..values.nrows() {
                let value = values[(i, j)];
                if !value.is_finite() {
                    return Err(ForecastError::NonFiniteRate {
                        age_group: i,
                        year: rates.first_year() + j as i32,
                        value,
                    });
                }
            }
        }
        Ok(transformed)
    }

    /// Back to rate space; undefined cells come back as NaN, not clipped
    pub fn invert(&self, transformed: &RateMatrix) -> RateMatrix {
        transformed.map(|y| self.inverse(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_cox_zero_is_log() {
        let bc = RateTransform::BoxCox { lambda: 0.0 };
        assert_relative_eq!(bc.forward(0.07), RateTransform::Log.forward(0.07));
        assert_relative_eq!(bc.inverse(-2.0), (-2.0f64).exp());
    }

    #[test]
    fn test_box_cox_inverse() {
        for &lambda in &[0.01, 0.19, 0.5, 1.0] {
            let t = RateTransform::BoxCox { lambda };
            for &x in &[0.001, 0.05, 0.3] {
                assert_relative_eq!(t.inverse(t.forward(x)), x, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_box_cox_inverse_undefined_is_nan() {
        let t = RateTransform::BoxCox { lambda: 0.3 };
        // lambda * y + 1 < 0 has no real inverse
        assert!(t.inverse(-10.0).is_nan());
    }

    #[test]
    fn test_box_cox_inverse_undefined_for_even_reciprocal() {
        // 1 / lambda is an even integer, so powf alone would return a positive value
        for &(lambda, y) in &[(0.5, -6.0), (0.25, -12.0), (0.1, -30.0), (0.01, -300.0)] {
            let t = RateTransform::BoxCox { lambda };
            assert!(t.inverse(y).is_nan(), "lambda {} y {} gave {}", lambda, y, t.inverse(y));
            let inside = t.inverse(-0.5 / lambda);
            assert!(inside.is_finite() && inside >= 0.0 && inside < 1.0);
        }
    }

    #[test]
    fn test_log_of_zero_rate_rejected() {
        let rates = RateMatrix::from_rows(&[vec![0.1, 0.0]], 1990).unwrap();
        match RateTransform::Log.apply(&rates) {
            Err(ForecastError::NonFiniteRate { age_group, year, .. }) => {
                assert_eq!(age_group, 0);
                assert_eq!(year, 1991);
            }
            other => panic!("expected NonFiniteRate, got {:?}", other),
        }
    }
}
