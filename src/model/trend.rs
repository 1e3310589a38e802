//! Damped additive trend exponential smoothing for year-effect series
//!
//! State recursions with damping `phi` held fixed:
//!
//! ```text
//! level[t] = alpha * y[t] + (1 - alpha) * (level[t-1] + phi * trend[t-1])
//! trend[t] = beta * (level[t] - level[t-1]) + (1 - beta) * phi * trend[t-1]
//! y_hat[n+h] = level[n] + (phi + phi^2 + ... + phi^h) * trend[n]
//! ```
//!
//! `alpha` and `beta` are chosen by minimizing the one-step-ahead squared
//! error with a deterministic grid-then-refine search; for each candidate the
//! starting level and trend are estimated jointly by least squares. `phi` is never
//! re-estimated here; it belongs to the calibration loop.

use nalgebra::DMatrix;

use crate::error::{ForecastError, Result};

/// Coarse grid resolution for the smoothing parameters
const COARSE_STEPS: usize = 20;
/// Refinement rounds, each shrinking the search box around the incumbent
const REFINE_ROUNDS: usize = 6;
const REFINE_STEPS: usize = 8;

/// Fitted damped-trend state for one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedTrendFit {
    pub alpha: f64,
    pub beta: f64,
    pub phi: f64,
    /// Estimated state before the first observation
    pub initial_level: f64,
    pub initial_trend: f64,
    /// Level after the last observation
    pub level: f64,
    /// Trend after the last observation
    pub trend: f64,
    /// Sum of squared one-step-ahead errors
    pub sse: f64,
}

impl DampedTrendFit {
    /// Point forecasts for the next `horizon` steps
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut damping = 0.0;
        let mut power = 1.0;
        (0..horizon)
            .map(|_| {
                power *= self.phi;
                damping += power;
                self.level + damping * self.trend
            })
            .collect()
    }
}

/// Damped-trend model with a fixed damping factor
#[derive(Debug, Clone, Copy)]
pub struct DampedTrend {
    phi: f64,
}

impl DampedTrend {
    pub fn new(phi: f64) -> Result<Self> {
        if !(phi > 0.0 && phi <= 1.0) {
            return Err(ForecastError::InvalidParameter {
                name: "phi",
                value: phi,
                reason: "damping factor must lie in (0, 1]",
            });
        }
        Ok(Self { phi })
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Fit smoothing parameters to `series` with `phi` held fixed
    ///
    /// `component` only labels the error when the series is too short.
    pub fn fit(&self, series: &[f64], component: usize) -> Result<DampedTrendFit> {
        if series.len() < 2 {
            return Err(ForecastError::InsufficientHistory {
                component,
                length: series.len(),
            });
        }

        let mut best = self.run(series, 0.0, 0.0);
        let coarse = 1.0 / COARSE_STEPS as f64;
        for a in 0..=COARSE_STEPS {
            for b in 0..=COARSE_STEPS {
                let candidate = self.run(series, a as f64 * coarse, b as f64 * coarse);
                if candidate.sse < best.sse {
                    best = candidate;
                }
            }
        }

        let mut radius = coarse;
        for _ in 0..REFINE_ROUNDS {
            let step = 2.0 * radius / REFINE_STEPS as f64;
            let (centre_a, centre_b) = (best.alpha, best.beta);
            for a in 0..=REFINE_STEPS {
                let alpha = (centre_a - radius + a as f64 * step).clamp(0.0, 1.0);
                for b in 0..=REFINE_STEPS {
                    let beta = (centre_b - radius + b as f64 * step).clamp(0.0, 1.0);
                    let candidate = self.run(series, alpha, beta);
                    if candidate.sse < best.sse {
                        best = candidate;
                    }
                }
            }
            radius /= REFINE_STEPS as f64 / 2.0;
        }

        Ok(best)
    }

    /// Filter with the given smoothing parameters from the best starting state
    ///
    /// One-step errors are affine in the starting level and trend, so the
    /// starting state minimizing the squared errors solves a 2x2 system.
    fn run(&self, series: &[f64], alpha: f64, beta: f64) -> DampedTrendFit {
        let base = self.errors(series, alpha, beta, 0.0, 0.0);
        let unit_level = self.errors(series, alpha, beta, 1.0, 0.0);
        let unit_trend = self.errors(series, alpha, beta, 0.0, 1.0);
        let (level0, trend0) = best_start(&base, &unit_level, &unit_trend)
            .unwrap_or((series[0], series[1] - series[0]));
        self.filter(series, alpha, beta, level0, trend0)
    }

    fn filter(&self, series: &[f64], alpha: f64, beta: f64, level0: f64, trend0: f64) -> DampedTrendFit {
        let mut state = (level0, trend0);
        let mut sse = 0.0;
        for &y in series {
            let error = self.step(&mut state, y, alpha, beta);
            sse += error * error;
        }
        DampedTrendFit {
            alpha,
            beta,
            phi: self.phi,
            initial_level: level0,
            initial_trend: trend0,
            level: state.0,
            trend: state.1,
            sse,
        }
    }

    fn errors(&self, series: &[f64], alpha: f64, beta: f64, level0: f64, trend0: f64) -> Vec<f64> {
        let mut state = (level0, trend0);
        series.iter().map(|&y| self.step(&mut state, y, alpha, beta)).collect()
    }

    /// Advance (level, trend) past `y`, returning the one-step-ahead error
    fn step(&self, state: &mut (f64, f64), y: f64, alpha: f64, beta: f64) -> f64 {
        let (level, trend) = *state;
        let predicted = level + self.phi * trend;
        let next_level = alpha * y + (1.0 - alpha) * predicted;
        let next_trend = beta * (next_level - level) + (1.0 - beta) * self.phi * trend;
        *state = (next_level, next_trend);
        y - predicted
    }
}

/// Least-squares starting (level, trend) given errors from three starts:
/// (0, 0), (1, 0) and (0, 1)
fn best_start(base: &[f64], unit_level: &[f64], unit_trend: &[f64]) -> Option<(f64, f64)> {
    let (mut a11, mut a12, mut a22, mut r1, mut r2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((&e, &l), &t) in base.iter().zip(unit_level).zip(unit_trend) {
        let (d1, d2) = (l - e, t - e);
        a11 += d1 * d1;
        a12 += d1 * d2;
        a22 += d2 * d2;
        r1 -= d1 * e;
        r2 -= d2 * e;
    }
    let det = a11 * a22 - a12 * a12;
    if !(det > 1e-12 * a11 * a22) {
        return None;
    }
    let level = (r1 * a22 - a12 * r2) / det;
    let trend = (a11 * r2 - a12 * r1) / det;
    (level.is_finite() && trend.is_finite()).then_some((level, trend))
}

/// Extends every year-effect column forward with its own damped-trend fit
#[derive(Debug, Clone, Copy)]
pub struct TrendProjector {
    model: DampedTrend,
}

impl TrendProjector {
    pub fn new(phi: f64) -> Result<Self> {
        Ok(Self { model: DampedTrend::new(phi)? })
    }

    pub fn phi(&self) -> f64 {
        self.model.phi()
    }

    /// Observed year effects followed by `n_years` forecast rows
    ///
    /// The first `year_effects.nrows()` rows are copied unchanged.
    pub fn project(&self, year_effects: &DMatrix<f64>, n_years: usize) -> Result<DMatrix<f64>> {
        let (n_obs, n_components) = year_effects.shape();
        let mut projected = DMatrix::zeros(n_obs + n_years, n_components);
        projected.rows_mut(0, n_obs).copy_from(year_effects);

        for k in 0..n_components {
            let series: Vec<f64> = year_effects.column(k).iter().copied().collect();
            let fit = self.model.fit(&series, k)?;
            log::trace!(
                "component {}: alpha={:.4} beta={:.4} phi={:.3} sse={:.3e}",
                k,
                fit.alpha,
                fit.beta,
                fit.phi,
                fit.sse
            );
            for (h, value) in fit.forecast(n_years).into_iter().enumerate() {
                projected[(n_obs + h, k)] = value;
            }
        }

        Ok(projected)
    }
}
