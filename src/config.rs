//! Run configuration loaded from JSON
//!
//! Every field has a default, so an empty object `{}` is a valid config.
//! Command-line flags override what is read here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationGrid, GridRange, Loss};
use crate::error::Result;
use crate::model::ModelSpec;
use crate::smoothing::{Smoother, DEFAULT_ROBUSTNESS_ITERATIONS, DEFAULT_SPAN};

/// Hyperparameter ranges, model settings and simulation settings for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Latent components kept from the decomposition (default: 6)
    #[serde(default = "default_components")]
    pub n_components: usize,

    /// Years projected past the last observed year (default: 30)
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// LOWESS span as a fraction of the series (default: 0.2)
    #[serde(default = "default_span")]
    pub smoothing_span: f64,

    #[serde(default = "default_robustness_iterations")]
    pub robustness_iterations: usize,

    #[serde(default = "GridRange::damping")]
    pub phi_grid: GridRange,

    #[serde(default = "GridRange::box_cox")]
    pub lambda_grid: GridRange,

    #[serde(default)]
    pub loss: Loss,

    /// Run LOWESS on Box-Cox fertility rates too
    #[serde(default)]
    pub smooth_fertility: bool,

    /// Monte Carlo draws per year (default: 100,000)
    #[serde(default = "default_draws")]
    pub draws: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_components() -> usize { 6 }
fn default_horizon() -> usize { 30 }
fn default_span() -> f64 { DEFAULT_SPAN }
fn default_robustness_iterations() -> usize { DEFAULT_ROBUSTNESS_ITERATIONS }
fn default_draws() -> usize { 100_000 }
fn default_seed() -> u64 { 42 }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            n_components: default_components(),
            horizon: default_horizon(),
            smoothing_span: default_span(),
            robustness_iterations: default_robustness_iterations(),
            phi_grid: GridRange::damping(),
            lambda_grid: GridRange::box_cox(),
            loss: Loss::default(),
            smooth_fertility: false,
            draws: default_draws(),
            seed: default_seed(),
        }
    }
}

impl ForecastConfig {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn smoother(&self) -> Result<Smoother> {
        Smoother::new(self.smoothing_span, self.robustness_iterations)
    }

    /// Log rates with LOWESS
    pub fn mortality_spec(&self) -> Result<ModelSpec> {
        Ok(ModelSpec::mortality(self.n_components).with_smoother(Some(self.smoother()?)))
    }

    /// Box-Cox rates, smoothed only when `smooth_fertility` is set
    pub fn fertility_spec(&self, lambda: f64) -> Result<ModelSpec> {
        let smoother = if self.smooth_fertility { Some(self.smoother()?) } else { None };
        Ok(ModelSpec::fertility(lambda, self.n_components).with_smoother(smoother))
    }

    /// Damping grid, plus the Box-Cox grid when `search_lambda` is set
    pub fn grid(&self, search_lambda: bool) -> Result<CalibrationGrid> {
        let lambda = search_lambda.then_some(self.lambda_grid);
        CalibrationGrid::from_ranges(self.phi_grid, lambda)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateTransform;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = ForecastConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ForecastConfig::default());
        assert_eq!(config.n_components, 6);
        assert_eq!(config.horizon, 30);
        assert_eq!(config.loss, Loss::MeanSquaredError);
    }

    #[test]
    fn test_partial_override() {
        let config = ForecastConfig::from_json_str(
            r#"{"horizon": 10, "loss": "squared_mean_error", "phi_grid": {"start": 0.9, "end": 1.0, "step": 0.05}}"#,
        )
        .unwrap();
        assert_eq!(config.horizon, 10);
        assert_eq!(config.loss, Loss::SquaredMeanError);
        let grid = config.grid(false).unwrap();
        assert_eq!(grid.phis.len(), 3);
        assert!(grid.lambdas.is_none());
        assert_eq!(config.grid(true).unwrap().len(), 300);
    }

    #[test]
    fn test_specs_follow_settings() {
        let mut config = ForecastConfig::default();
        let mortality = config.mortality_spec().unwrap();
        assert_eq!(mortality.transform, RateTransform::Log);
        assert!(mortality.smoother.is_some());

        assert!(config.fertility_spec(0.4).unwrap().smoother.is_none());
        config.smooth_fertility = true;
        config.smoothing_span = 0.3;
        let fertility = config.fertility_spec(0.4).unwrap();
        assert_eq!(fertility.smoother.map(|s| s.span()), Some(0.3));

        config.smoothing_span = 1.5;
        assert!(config.mortality_spec().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.json");
        std::fs::write(&path, r#"{"n_components": 3, "seed": 11}"#).unwrap();
        let config = ForecastConfig::from_json_path(&path).unwrap();
        assert_eq!(config.n_components, 3);
        assert_eq!(config.seed, 11);
        assert!(ForecastConfig::from_json_path(&dir.path().join("missing.json")).is_err());
    }
}
