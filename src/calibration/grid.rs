//! Hyperparameter grids and the held-out loss

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Inclusive arithmetic range `start, start + step, ..., end`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl GridRange {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    /// Damping factors 0.800, 0.801, ..., 1.000
    pub fn damping() -> Self {
        Self::new(0.800, 1.000, 0.001)
    }

    /// Box-Cox parameters 0.01, 0.02, ..., 1.00
    pub fn box_cox() -> Self {
        Self::new(0.01, 1.00, 0.01)
    }

    /// Grid points, computed by index so the last point is hit exactly
    pub fn values(&self, name: &'static str) -> Result<Vec<f64>> {
        if !(self.step > 0.0) || !(self.end >= self.start) {
            return Err(ForecastError::InvalidParameter {
                name,
                value: self.step,
                reason: "grid needs a positive step and end >= start",
            });
        }
        let count = ((self.end - self.start) / self.step + 1e-9).floor() as usize + 1;
        Ok((0..count)
            .map(|i| {
                let v = self.start + i as f64 * self.step;
                // snap to the step's decimal precision
                (v / self.step).round() * self.step
            })
            .collect())
    }
}

/// Candidate damping factors and, optionally, Box-Cox parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationGrid {
    pub phis: Vec<f64>,
    /// `None` keeps the model's own transform fixed
    pub lambdas: Option<Vec<f64>>,
}

impl CalibrationGrid {
    /// Damping only, over the default range
    pub fn damping() -> Result<Self> {
        Ok(Self {
            phis: GridRange::damping().values("phi")?,
            lambdas: None,
        })
    }

    /// Box-Cox parameter and damping, over the default ranges
    pub fn box_cox_and_damping() -> Result<Self> {
        Ok(Self {
            phis: GridRange::damping().values("phi")?,
            lambdas: Some(GridRange::box_cox().values("lambda")?),
        })
    }

    pub fn from_ranges(phi: GridRange, lambda: Option<GridRange>) -> Result<Self> {
        Ok(Self {
            phis: phi.values("phi")?,
            lambdas: lambda.map(|r| r.values("lambda")).transpose()?,
        })
    }

    pub fn len(&self) -> usize {
        self.phis.len() * self.lambdas.as_ref().map_or(1, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error statistic between forecast and held-out observed rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Mean of squared cellwise errors
    #[default]
    MeanSquaredError,
    /// Square of the mean cellwise error
    SquaredMeanError,
}

impl Loss {
    /// NaN when there are no cells; non-finite when any cell is
    pub fn evaluate(&self, cells: &[(f64, f64)]) -> f64 {
        if cells.is_empty() {
            return f64::NAN;
        }
        let n = cells.len() as f64;
        match self {
            Self::MeanSquaredError => cells.iter().map(|(f, o)| (f - o).powi(2)).sum::<f64>() / n,
            Self::SquaredMeanError => (cells.iter().map(|(f, o)| f - o).sum::<f64>() / n).powi(2),
        }
    }
}
