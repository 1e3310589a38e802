//! Hyperparameter calibration against held-out years

mod calibrator;
mod grid;

pub use calibrator::{CalibrationResult, Calibrator, CandidateScore};
pub use grid::{CalibrationGrid, GridRange, Loss};
