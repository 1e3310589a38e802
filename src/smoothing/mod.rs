//! Locally weighted scatterplot smoothing along the year axis
//!
//! Each age group's year series is smoothed independently with the `lowess`
//! batch adapter: local linear fits over the nearest `span * n` years with
//! tricube weights, followed by bisquare robustness passes. Years are equally
//! spaced, so x is simply the column index.

use lowess::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::rates::RateMatrix;

/// Default fraction of the series treated as local
pub const DEFAULT_SPAN: f64 = 0.2;

/// Default number of robustness reweighting passes
pub const DEFAULT_ROBUSTNESS_ITERATIONS: usize = 3;

/// LOWESS smoother applied row by row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Smoother {
    span: f64,
    robustness_iterations: usize,
}

impl Default for Smoother {
    fn default() -> Self {
        Self {
            span: DEFAULT_SPAN,
            robustness_iterations: DEFAULT_ROBUSTNESS_ITERATIONS,
        }
    }
}

impl Smoother {
    pub fn new(span: f64, robustness_iterations: usize) -> Result<Self> {
        if !(span > 0.0 && span <= 1.0) {
            return Err(ForecastError::InvalidParameter {
                name: "span",
                value: span,
                reason: "must lie in (0, 1]",
            });
        }
        Ok(Self { span, robustness_iterations })
    }

    pub fn span(&self) -> f64 {
        self.span
    }

    pub fn robustness_iterations(&self) -> usize {
        self.robustness_iterations
    }

    /// Smooth every age group's year series; same shape and indexing
    pub fn smooth(&self, matrix: &RateMatrix) -> Result<RateMatrix> {
        let mut values = matrix.values().clone();
        for age in 0..matrix.n_ages() {
            let smoothed = self.smooth_series(&matrix.series(age))?;
            for (j, v) in smoothed.into_iter().enumerate() {
                values[(age, j)] = v;
            }
        }
        matrix.with_values(values)
    }

    /// Smooth one equally spaced series; fewer than two points pass through
    pub fn smooth_series(&self, y: &[f64]) -> Result<Vec<f64>> {
        if y.len() < 2 {
            return Ok(y.to_vec());
        }
        let x: Vec<f64> = (0..y.len()).map(|t| t as f64).collect();

        let model = Lowess::new()
            .fraction(self.span)
            .iterations(self.robustness_iterations)
            .build()?;
        Ok(model.fit(&x, y)?.y)
    }
}
