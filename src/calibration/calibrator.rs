//! Cross-validated grid search over damping and Box-Cox parameters
//!
//! For every candidate the model is fitted on the (shorter) fitting window,
//! projected far enough to cover the held-out years, and scored against the
//! observed rates on every calendar year both cover. Lambda is the outer
//! loop because it changes the fitted model; phi only changes the projection,
//! so the phi candidates for one lambda share a single decomposition and are
//! evaluated in parallel. A lambda whose transform cannot be fitted scores
//! NaN for all its phi candidates instead of ending the search.

use rayon::prelude::*;
use serde::Serialize;

use super::grid::{CalibrationGrid, Loss};
use crate::error::{ForecastError, Result};
use crate::model::{BilinearRateModel, ModelSpec};
use crate::rates::{RateData, RateMatrix, RateTransform};

/// Loss for one (lambda, phi) combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub lambda: Option<f64>,
    pub phi: f64,
    pub loss: f64,
}

/// Best hyperparameters found by the grid search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub phi: f64,
    /// Only set when the grid searched Box-Cox parameters
    pub lambda: Option<f64>,
    pub loss: f64,
    /// Every candidate in grid order, lambda-major
    pub scores: Vec<CandidateScore>,
}

impl CalibrationResult {
    /// `base` with the selected transform parameter applied
    pub fn apply_to(&self, base: ModelSpec) -> ModelSpec {
        match self.lambda {
            Some(lambda) => base.with_transform(RateTransform::BoxCox { lambda }),
            None => base,
        }
    }
}

/// Grid-search calibrator for a bilinear rate model
#[derive(Debug, Clone)]
pub struct Calibrator {
    spec: ModelSpec,
    grid: CalibrationGrid,
    loss: Loss,
}

impl Calibrator {
    pub fn new(spec: ModelSpec, grid: CalibrationGrid) -> Self {
        Self {
            spec,
            grid,
            loss: Loss::default(),
        }
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn grid(&self) -> &CalibrationGrid {
        &self.grid
    }

    /// Fit on `data` up to `fit_last_year` and score against all of `data`
    pub fn calibrate_split(&self, data: &RateData, fit_last_year: i32) -> Result<CalibrationResult> {
        let first_year = data.counts().first_year();
        let fit_window = data.window(first_year, fit_last_year)?;
        let observed = data.crude_rates()?;
        self.calibrate(&fit_window, &observed)
    }

    /// Search the grid; `held_out` holds observed rates extending past the
    /// fitting window
    pub fn calibrate(&self, fit_window: &RateData, held_out: &RateMatrix) -> Result<CalibrationResult> {
        if self.grid.is_empty() {
            return Err(ForecastError::InvalidParameter {
                name: "grid",
                value: 0.0,
                reason: "calibration grid has no candidates",
            });
        }

        let fit_last = fit_window.counts().last_year();
        let horizon = held_out.last_year() - fit_last;
        if horizon < 1 {
            return Err(ForecastError::InvalidParameter {
                name: "horizon",
                value: horizon as f64,
                reason: "held-out rates must extend past the fitting window",
            });
        }
        let horizon = horizon as usize;

        let lambdas: Vec<Option<f64>> = match &self.grid.lambdas {
            Some(values) => values.iter().copied().map(Some).collect(),
            None => vec![None],
        };

        let mut scores = Vec::with_capacity(self.grid.len());
        for lambda in lambdas {
            let spec = match lambda {
                Some(l) => self.spec.with_transform(RateTransform::BoxCox { lambda: l }),
                None => self.spec,
            };
            let model = match BilinearRateModel::fit(fit_window, spec) {
                Ok(model) => model,
                // a transform that breaks on these rates only rules out its own candidates
                Err(err @ (ForecastError::NonFiniteRate { .. } | ForecastError::Smoothing(_))) => {
                    log::warn!("{:?}: fit failed, scoring as NaN: {}", spec.transform, err);
                    scores.extend(self.grid.phis.iter().map(|&phi| CandidateScore {
                        lambda,
                        phi,
                        loss: f64::NAN,
                    }));
                    continue;
                }
                Err(err) => return Err(err),
            };

            let batch = self
                .grid
                .phis
                .par_iter()
                .map(|&phi| {
                    let forecast = model.forecast(horizon, phi)?;
                    let cells = forecast.rates.overlapping_cells(held_out)?;
                    Ok(CandidateScore {
                        lambda,
                        phi,
                        loss: self.loss.evaluate(&cells),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            if let Some(l) = lambda {
                let best = batch.iter().map(|s| s.loss).filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
                log::debug!("lambda {:.2}: best loss {:.6e}", l, best);
            }
            scores.extend(batch);
        }

        select(scores)
    }
}

/// First candidate with the smallest finite loss
fn select(scores: Vec<CandidateScore>) -> Result<CalibrationResult> {
    let best = scores
        .iter()
        .filter(|s| s.loss.is_finite())
        .fold(None::<&CandidateScore>, |best, s| match best {
            Some(b) if b.loss <= s.loss => Some(b),
            _ => Some(s),
        })
        .copied();

    let Some(best) = best else {
        let (lo, hi) = scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s.phi), hi.max(s.phi)));
        let lambdas = scores.iter().filter_map(|s| s.lambda).collect::<Vec<_>>();
        let lambda_detail = match (lambdas.first(), lambdas.last()) {
            (Some(a), Some(b)) => format!(", lambda in [{}, {}]", a, b),
            _ => String::new(),
        };
        return Err(ForecastError::CalibrationFailed {
            tried: scores.len(),
            detail: format!("no finite loss for phi in [{}, {}]{}", lo, hi, lambda_detail),
        });
    };

    log::info!(
        "calibrated phi={:.3}{} loss={:.6e} over {} candidates",
        best.phi,
        best.lambda.map(|l| format!(" lambda={:.2}", l)).unwrap_or_default(),
        best.loss,
        scores.len()
    );

    Ok(CalibrationResult {
        phi: best.phi,
        lambda: best.lambda,
        loss: best.loss,
        scores,
    })
}
