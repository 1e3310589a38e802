//! Demographic Forecast - age-by-year fertility and mortality rate projection
//!
//! This library provides:
//! - Rate matrices built from counts and exposures, with log / Box-Cox transforms
//! - LOWESS smoothing of each age group's year series
//! - Rank-k bilinear (age effect x year effect) decomposition via SVD
//! - Damped additive trend projection of the year effects
//! - Grid-search calibration of the damping factor and Box-Cox parameter
//! - Truncated-normal Monte Carlo bands around projected year effects

pub mod calibration;
pub mod config;
pub mod error;
pub mod model;
pub mod rates;
pub mod simulation;
pub mod smoothing;

// Re-export commonly used types
pub use calibration::{CalibrationGrid, CalibrationResult, Calibrator, Loss};
pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use model::{BilinearRateModel, Forecast, ModelSpec, RateWarning};
pub use rates::{RateBuilder, RateData, RateMatrix, RateTransform};
pub use simulation::{PercentileBand, YearEffectSimulator};
pub use smoothing::Smoother;
