//! Bilinear rate model: decomposition, trend projection and reconstruction

mod bilinear;
mod decomposition;
mod reconstruct;
mod trend;

pub use bilinear::{BilinearRateModel, ModelSpec};
pub use decomposition::{BilinearDecomposer, Decomposition};
pub use reconstruct::{Forecast, RateWarning, Reconstructor};
pub use trend::{DampedTrend, DampedTrendFit, TrendProjector};
