//! Rate matrices, stabilizing transforms and CSV exchange

mod builder;
mod matrix;
mod transform;
pub mod loader;

pub use builder::{crude_rates, RateBuilder, RateData};
pub use loader::{load_matrix, write_matrix};
pub use matrix::RateMatrix;
pub use transform::RateTransform;
